mod common;

use common::{TID, page, vm, vm_with_process};
use kernel_alloc::PagePool;
use kernel_vm::{FrameEntry, Tid};

#[test]
fn allocate_bind_and_free() {
    let vm = vm_with_process(2, 0);
    let frame = vm.allocate_frame(TID, true);
    assert_eq!(
        vm.lookup_frame(frame),
        Some(FrameEntry {
            frame,
            owner: TID,
            page: None,
        })
    );
    assert!(vm.pool().is_allocated(frame));

    let p = page(0x1000_0000);
    vm.bind(frame, p);
    assert_eq!(vm.lookup_frame(frame).unwrap().page, Some(p));
    assert_eq!(vm.frame_count(), 1);

    vm.free_frame(frame);
    assert_eq!(vm.lookup_frame(frame), None);
    assert_eq!(vm.frame_count(), 0);
    assert!(!vm.pool().is_allocated(frame));
}

#[test]
fn frames_are_listed_per_owner() {
    let vm = vm(4, 0);
    let a = vm.allocate_frame(Tid(1), false);
    let b = vm.allocate_frame(Tid(2), false);
    let c = vm.allocate_frame(Tid(1), false);

    let mut mine: Vec<_> = vm.frames_of(Tid(1)).iter().map(|e| e.frame).collect();
    mine.sort();
    let mut expected = vec![a, c];
    expected.sort();
    assert_eq!(mine, expected);
    assert_eq!(vm.frames_of(Tid(2)).len(), 1);
    assert_eq!(vm.frames_of(Tid(2))[0].frame, b);
    assert!(vm.frames_of(Tid(3)).is_empty());
}

#[test]
fn zeroed_frames_are_zero() {
    let vm = vm(1, 0);
    let frame = vm.allocate_frame(TID, false);
    vm.pool().with_page(frame, |bytes| bytes.fill(0xAB));
    vm.free_frame(frame);

    let again = vm.allocate_frame(TID, true);
    assert!(vm.pool().with_page(again, |bytes| bytes.iter().all(|b| *b == 0)));
}

#[test]
#[should_panic(expected = "free of untracked frame")]
fn freeing_an_untracked_frame_panics() {
    let vm = vm(2, 0);
    let frame = vm.allocate_frame(TID, false);
    vm.free_frame(frame);
    vm.free_frame(frame);
}

#[test]
#[should_panic(expected = "bind of untracked frame")]
fn binding_an_untracked_frame_panics() {
    let vm = vm(2, 0);
    let frame = vm.allocate_frame(TID, false);
    vm.free_frame(frame);
    vm.bind(frame, page(0x1000_0000));
}
