//! Live-block tracking and pointer validation.
//!
//! The checker shadows every heap block the interpreter allocates with
//! a `ptr -> (size, origin)` entry and validates pointer and size
//! operands before raw memory is touched. It exists to turn silent
//! corruption into precise diagnostics; the `memory-checks` feature
//! (default on) compiles it in, and without the feature every method
//! collapses to a no-op so release builds carry no cost.

use crate::allocator::Allocator;
use core_types::{AtomId, Lvid};
use std::fmt;

#[cfg(feature = "memory-checks")]
use crate::object::HEADER_SIZE;
#[cfg(feature = "memory-checks")]
use std::collections::BTreeMap;

/// What the checker remembers about one live block.
///
/// Tracked pointers are object pointers (first payload byte) and sizes
/// are the payload sizes programs declared, without the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedBlock {
    /// Payload size in bytes, as declared at allocation.
    pub size: usize,
    /// Atom whose sequence allocated the block.
    pub atom: AtomId,
    /// Register that received the object pointer at allocation.
    pub lvid: Lvid,
}

/// A validation failure, reported with the raw addresses involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// The address does not resolve to any live tracked block.
    UnknownPointer {
        /// The offending address.
        ptr: usize,
    },
    /// The claimed size does not fit the tracked block.
    SizeMismatch {
        /// Block address.
        ptr: usize,
        /// Size the checker tracked at allocation.
        tracked: usize,
        /// Size the instruction claimed.
        claimed: usize,
    },
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CheckError::UnknownPointer { ptr } => {
                write!(f, "unknown pointer {:#x}", ptr)
            }
            CheckError::SizeMismatch {
                ptr,
                tracked,
                claimed,
            } => write!(
                f,
                "size mismatch for block {:#x}: tracked {} bytes, claimed {}",
                ptr, tracked, claimed
            ),
        }
    }
}

/// Shadow table of live heap blocks.
///
/// One checker belongs to one execution context; it is not shared.
#[derive(Debug, Default)]
pub struct MemoryChecker {
    #[cfg(feature = "memory-checks")]
    blocks: BTreeMap<usize, TrackedBlock>,
}

impl MemoryChecker {
    /// Creates an empty checker.
    pub fn new() -> Self {
        MemoryChecker::default()
    }

    /// Whether validation is compiled in.
    pub const fn is_enabled() -> bool {
        cfg!(feature = "memory-checks")
    }

    /// Records a freshly allocated block.
    pub fn track(&mut self, ptr: *const u8, size: usize, atom: AtomId, lvid: Lvid) {
        #[cfg(feature = "memory-checks")]
        self.blocks
            .insert(ptr as usize, TrackedBlock { size, atom, lvid });
        #[cfg(not(feature = "memory-checks"))]
        let _ = (ptr, size, atom, lvid);
    }

    /// Forgets a block after it has been released.
    pub fn untrack(&mut self, ptr: *const u8) {
        #[cfg(feature = "memory-checks")]
        self.blocks.remove(&(ptr as usize));
        #[cfg(not(feature = "memory-checks"))]
        let _ = ptr;
    }

    /// Moves a tracked block to its post-reallocation address and size,
    /// keeping the original allocation origin.
    pub fn transfer(&mut self, old: *const u8, new: *const u8, new_size: usize) {
        #[cfg(feature = "memory-checks")]
        if let Some(mut block) = self.blocks.remove(&(old as usize)) {
            block.size = new_size;
            self.blocks.insert(new as usize, block);
        }
        #[cfg(not(feature = "memory-checks"))]
        let _ = (old, new, new_size);
    }

    /// Validates a pointer whose claimed size must equal the tracked
    /// block size exactly (free, reallocate, destroy).
    pub fn verify_exact(&self, ptr: *const u8, claimed: usize) -> Result<(), CheckError> {
        #[cfg(feature = "memory-checks")]
        {
            let addr = ptr as usize;
            let block = self
                .blocks
                .get(&addr)
                .ok_or(CheckError::UnknownPointer { ptr: addr })?;
            if block.size != claimed {
                return Err(CheckError::SizeMismatch {
                    ptr: addr,
                    tracked: block.size,
                    claimed,
                });
            }
            Ok(())
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            let _ = (ptr, claimed);
            Ok(())
        }
    }

    /// Validates a byte span inside a tracked block (fill, copy, move,
    /// compare). The address may point anywhere within the block; the
    /// span must not run past its end, even into an adjacent block.
    pub fn verify_span(&self, ptr: *const u8, span: usize) -> Result<(), CheckError> {
        #[cfg(feature = "memory-checks")]
        {
            let addr = ptr as usize;
            let (base, block) = self
                .blocks
                .range(..=addr)
                .next_back()
                .ok_or(CheckError::UnknownPointer { ptr: addr })?;
            let offset = addr - base;
            if offset > block.size {
                return Err(CheckError::UnknownPointer { ptr: addr });
            }
            if span > block.size - offset {
                return Err(CheckError::SizeMismatch {
                    ptr: *base,
                    tracked: block.size,
                    claimed: offset.saturating_add(span),
                });
            }
            Ok(())
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            let _ = (ptr, span);
            Ok(())
        }
    }

    /// Validates a single load or store of `width` bytes through a
    /// pointer into a tracked block.
    pub fn verify_access(&self, ptr: *const u8, width: usize) -> Result<(), CheckError> {
        self.verify_span(ptr, width)
    }

    /// Validates that a pointer is the start of a live tracked block,
    /// without claiming a size (ref, unref, dispose). The refcount
    /// header only exists in front of block starts, so an interior
    /// pointer is rejected here even when it lies inside a block.
    pub fn verify_object(&self, ptr: *const u8) -> Result<(), CheckError> {
        #[cfg(feature = "memory-checks")]
        {
            let addr = ptr as usize;
            if self.blocks.contains_key(&addr) {
                Ok(())
            } else {
                Err(CheckError::UnknownPointer { ptr: addr })
            }
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            let _ = ptr;
            Ok(())
        }
    }

    /// Whether a pointer currently matches a tracked block.
    pub fn contains(&self, ptr: *const u8) -> bool {
        #[cfg(feature = "memory-checks")]
        {
            self.blocks.contains_key(&(ptr as usize))
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            let _ = ptr;
            false
        }
    }

    /// Number of live tracked blocks.
    pub fn tracked_count(&self) -> usize {
        #[cfg(feature = "memory-checks")]
        {
            self.blocks.len()
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            0
        }
    }

    /// Total payload bytes across live tracked blocks.
    pub fn tracked_bytes(&self) -> usize {
        #[cfg(feature = "memory-checks")]
        {
            self.blocks.values().map(|b| b.size).sum()
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            0
        }
    }

    /// Snapshot of every live block, sorted by address for stable
    /// reports.
    pub fn leaks(&self) -> Vec<(usize, TrackedBlock)> {
        #[cfg(feature = "memory-checks")]
        {
            self.blocks.iter().map(|(a, b)| (*a, *b)).collect()
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            Vec::new()
        }
    }

    /// Releases every tracked block back to `allocator` and forgets
    /// them. Returns how many blocks were freed. Used after an abort,
    /// when surviving blocks would otherwise leak.
    pub fn purge(&mut self, allocator: &dyn Allocator) -> usize {
        #[cfg(feature = "memory-checks")]
        {
            let blocks = std::mem::take(&mut self.blocks);
            let count = blocks.len();
            for (addr, block) in blocks {
                // Tracked addresses are object pointers; the block
                // starts one header word earlier.
                let start = (addr - HEADER_SIZE) as *mut u8;
                allocator.deallocate(start, block.size + HEADER_SIZE);
            }
            count
        }
        #[cfg(not(feature = "memory-checks"))]
        {
            let _ = allocator;
            0
        }
    }
}
