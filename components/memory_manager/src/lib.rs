//! Memory Manager Component
//!
//! Raw memory services for the virtual machine: the [`Allocator`]
//! routing trait with its system-backed and byte-capped
//! implementations, the heap block layout (a reference-count header
//! word in front of every payload), and the optional [`MemoryChecker`]
//! that tracks live blocks and validates pointers and sizes.
//!
//! The checker is compiled in through the `memory-checks` cargo feature
//! (enabled by default). Without it the checker type still exists but
//! is zero-sized and every method is an inlineable no-op, so production
//! builds pay nothing for it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod checker;
pub mod object;

pub use allocator::{Allocator, LimitedAllocator, LowMemoryHook, SystemAllocator};
pub use checker::{CheckError, MemoryChecker, TrackedBlock};
pub use object::HEADER_SIZE;
