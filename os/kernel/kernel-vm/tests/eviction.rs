mod common;

use common::{
    FAR_SP, MemFile, MemSwap, TID, force_eviction, page, pattern, touch, vm_with_process,
    vm_with_swap,
};
use kernel_alloc::PagePool;
use kernel_memory_addresses::PAGE_SIZE_U64;
use kernel_vm::{BackingKind, Location, Tid};
use kernel_vmem::PageDirectory;
use std::sync::Arc;

#[test]
fn unaccessed_frame_is_evicted_before_accessed_one() {
    let vm = vm_with_process(2, 4);
    let space = vm.address_space(TID).unwrap();
    let p1 = page(0x1000_0000);
    let p2 = page(0x1000_1000);

    let a = vm.allocate_frame(TID, true);
    vm.install_page(TID, p1, a, true).unwrap();
    touch(&vm, TID, p1, false);
    let b = vm.allocate_frame(TID, true);
    vm.install_page(TID, p2, b, true).unwrap();

    let c = vm.allocate_frame(Tid(2), false);
    assert_eq!(c, b, "B was not accessed and goes first");

    assert_eq!(space.directory().get_mapping(p1), Some(a));
    assert!(!space.directory().is_accessed(p1), "second chance clears the bit");
    assert_eq!(space.directory().get_mapping(p2), None);

    let evicted = vm.lookup_page(TID, p2).unwrap();
    assert_eq!(evicted.kind, BackingKind::Anonymous);
    assert!(matches!(evicted.location, Location::Swapped(_)));
    assert!(evicted.writable);

    let entry = vm.lookup_frame(c).unwrap();
    assert_eq!(entry.owner, Tid(2));
    assert_eq!(entry.page, None);
}

#[test]
fn all_accessed_frames_fall_back_to_second_pass() {
    let vm = vm_with_process(3, 4);
    let pages: Vec<_> = (0..3).map(|i| page(0x2000_0000 + i * PAGE_SIZE_U64)).collect();
    let mut frames = Vec::new();
    for &p in &pages {
        let f = vm.allocate_frame(TID, true);
        vm.install_page(TID, p, f, true).unwrap();
        touch(&vm, TID, p, false);
        frames.push(f);
    }

    let stolen = vm.allocate_frame(Tid(2), false);
    assert_eq!(stolen, frames[0], "first frame in insertion order");

    let space = vm.address_space(TID).unwrap();
    assert_eq!(space.directory().get_mapping(pages[0]), None);
    for &p in &pages[1..] {
        assert!(space.directory().get_mapping(p).is_some());
        assert!(!space.directory().is_accessed(p));
    }
}

#[test]
fn swapped_page_round_trips_with_contents() {
    let vm = vm_with_process(1, 4);
    let p = page(0x1000_0000);
    let frame = vm.allocate_frame(TID, true);
    vm.install_page(TID, p, frame, true).unwrap();
    let data = pattern(7);
    vm.copy_to_user(TID, p.base(), &data, FAR_SP).unwrap();

    force_eviction(&vm);
    assert!(matches!(
        vm.lookup_page(TID, p).unwrap().location,
        Location::Swapped(_)
    ));
    assert_eq!(vm.swap().in_use(), 1);

    let mut back = vec![0; data.len()];
    vm.copy_from_user(TID, p.base(), &mut back, FAR_SP).unwrap();
    assert_eq!(back, data);
    assert_eq!(vm.swap().in_use(), 0, "slot released on load");
    let space = vm.address_space(TID).unwrap();
    assert!(space.directory().is_writable(p));
}

#[test]
fn read_only_page_stays_read_only_after_swap() {
    let vm = vm_with_process(1, 4);
    let p = page(0x1000_0000);
    let frame = vm.allocate_frame(TID, true);
    let data = pattern(3);
    vm.pool().with_page(frame, |bytes| bytes.copy_from_slice(&data));
    vm.install_page(TID, p, frame, false).unwrap();

    force_eviction(&vm);
    let summary = vm.lookup_page(TID, p).unwrap();
    assert!(matches!(summary.location, Location::Swapped(_)));
    assert!(!summary.writable);

    let mut back = vec![0; data.len()];
    vm.copy_from_user(TID, p.base(), &mut back, FAR_SP).unwrap();
    assert_eq!(back, data);
    let space = vm.address_space(TID).unwrap();
    assert!(!space.directory().is_writable(p));
}

#[test]
fn clean_executable_page_is_dropped_not_swapped() {
    let vm = vm_with_process(1, 4);
    let contents = pattern(11);
    let file = Arc::new(MemFile::new(contents.clone()));
    let base = page(0x0804_8000);
    vm.register_segment(TID, &file, 0, base, PAGE_SIZE_U64, 0, false)
        .unwrap();

    let mut first = vec![0; contents.len()];
    vm.copy_from_user(TID, base.base(), &mut first, FAR_SP).unwrap();
    assert_eq!(first, contents);

    force_eviction(&vm);
    assert_eq!(vm.swap().writes(), 0);
    let summary = vm.lookup_page(TID, base).unwrap();
    assert_eq!(summary.location, Location::Unloaded);
    assert_eq!(summary.kind, BackingKind::Executable);
    assert!(!summary.modified);

    let mut again = vec![0; contents.len()];
    vm.copy_from_user(TID, base.base(), &mut again, FAR_SP).unwrap();
    assert_eq!(again, contents);
}

#[test]
fn written_executable_page_goes_to_swap_for_good() {
    let vm = vm_with_process(1, 4);
    let file = Arc::new(MemFile::new(pattern(1)));
    let base = page(0x0805_0000);
    vm.register_segment(TID, &file, 0, base, PAGE_SIZE_U64, 0, true)
        .unwrap();

    let data = pattern(99);
    vm.copy_to_user(TID, base.base(), &data, FAR_SP).unwrap();
    force_eviction(&vm);
    let summary = vm.lookup_page(TID, base).unwrap();
    assert!(matches!(summary.location, Location::Swapped(_)));
    assert!(summary.modified);
    assert_eq!(file.contents(), pattern(1), "executables are never written");

    // Read only, so the page is clean this time round, but the file copy is stale.
    let mut back = vec![0; data.len()];
    vm.copy_from_user(TID, base.base(), &mut back, FAR_SP).unwrap();
    assert_eq!(back, data);
    force_eviction(&vm);
    assert!(matches!(
        vm.lookup_page(TID, base).unwrap().location,
        Location::Swapped(_)
    ));
    assert_eq!(vm.swap().writes(), 2);
}

#[test]
fn evicted_frame_comes_back_zeroed() {
    let vm = vm_with_process(1, 4);
    let p = page(0x1000_0000);
    let frame = vm.allocate_frame(TID, true);
    vm.install_page(TID, p, frame, true).unwrap();
    vm.copy_to_user(TID, p.base(), &pattern(5), FAR_SP).unwrap();

    let reused = vm.allocate_frame(Tid(2), false);
    assert_eq!(reused, frame);
    assert!(vm.pool().with_page(reused, |bytes| bytes.iter().all(|b| *b == 0)));
}

#[test]
#[should_panic(expected = "kernel halted: no frame can be evicted")]
fn halts_when_no_frame_is_bound() {
    let vm = vm_with_process(1, 4);
    let _unbound = vm.allocate_frame(TID, false);
    let _ = vm.allocate_frame(TID, false);
}

#[test]
#[should_panic(expected = "kernel halted: cannot swap out")]
fn halts_when_swap_is_full() {
    let vm = vm_with_process(1, 0);
    let p = page(0x1000_0000);
    let frame = vm.allocate_frame(TID, true);
    vm.install_page(TID, p, frame, true).unwrap();
    force_eviction(&vm);
}

#[test]
#[should_panic(expected = "I/O error on swap slot 0")]
fn halts_when_swap_write_fails() {
    let vm = vm_with_swap(1, MemSwap::broken(4));
    let p = page(0x1000_0000);
    let frame = vm.allocate_frame(TID, true);
    vm.install_page(TID, p, frame, true).unwrap();
    force_eviction(&vm);
}
