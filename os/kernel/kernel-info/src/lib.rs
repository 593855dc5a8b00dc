//! # Kernel Memory Configuration
//!
//! Compile-time constants that describe the user half of every address space
//! and the limits the page-fault handler enforces on it. Every crate that
//! reasons about user addresses (the frame table, the fault handler, the
//! `mmap` implementation) takes its numbers from here so the policy cannot
//! drift between components.
//!
//! ## User Address Space Layout
//!
//! ```text
//! 0x0000_0000            ┌─────────────────────────────────┐
//!                        │  unmapped (null page)           │
//! 0x0804_8000 (typical)  ├─────────────────────────────────┤
//!                        │  executable segments            │
//!                        │  (lazily loaded, file-backed)   │
//!                        ├─────────────────────────────────┤
//!                        │  mmap regions                   │
//!                        │  (file-backed, written back)    │
//!                        │              ...                │
//! USER_STACK_LIMIT       ├─────────────────────────────────┤
//!                        │  stack, grows down on demand    │
//!                        │  (anonymous, swap-backed)       │
//! USER_STACK_TOP         ├─────────────────────────────────┤ = USER_SPACE_END
//!                        │  kernel                         │
//!                        └─────────────────────────────────┘
//! ```
//!
//! ## Configuration Management
//!
//! All values are `const` and checked by compile-time assertions. Components
//! that need to run with different limits (tests, mostly) take a runtime copy
//! of these values and override it there; the constants stay the defaults.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
