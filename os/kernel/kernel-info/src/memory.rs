//! # Memory Layout

/// First address that no longer belongs to user space.
///
/// Faults at or above this address are never resolved on behalf of a user
/// process.
pub const USER_SPACE_END: u64 = 0xC000_0000;

/// Top of the initial user stack (exclusive). The first stack page is the one
/// directly below it.
pub const USER_STACK_TOP: u64 = USER_SPACE_END;

/// How far below the stack pointer an access may land and still count as
/// stack growth.
///
/// The widest push-style instruction writes 32 bytes below the stack pointer
/// before adjusting it.
pub const STACK_SLACK: u64 = 32;

/// Largest size the user stack may grow to.
pub const MAX_STACK_SIZE: u64 = 8 * 1024 * 1024;

/// Lowest address that may be claimed by stack growth.
pub const USER_STACK_LIMIT: u64 = USER_STACK_TOP - MAX_STACK_SIZE;

/// Base address of the physical frames handed to user processes.
pub const USER_POOL_BASE: u64 = 0x0010_0000; // 1 MiB

const _: () = {
    assert!(USER_SPACE_END.is_multiple_of(4096));
    assert!(USER_STACK_TOP <= USER_SPACE_END);
    assert!(MAX_STACK_SIZE.is_multiple_of(4096));
    assert!(MAX_STACK_SIZE < USER_STACK_TOP);
    assert!(STACK_SLACK < 4096);
    assert!(USER_POOL_BASE.is_multiple_of(4096));
};
