//! Allocator routing.
//!
//! The interpreter never calls `std::alloc` directly; every heap
//! operation goes through an [`Allocator`] trait object chosen at
//! context creation. [`SystemAllocator`] is the production route;
//! [`LimitedAllocator`] caps total live bytes and exists to exercise
//! allocation-failure paths in tests.

use parking_lot::Mutex;
use std::alloc::{alloc, dealloc, realloc, Layout};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Alignment of every block handed out by the built-in allocators.
/// The reference-count header word relies on it.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// Callback invoked when an allocation request cannot be satisfied,
/// with the size that failed.
pub type LowMemoryHook = Box<dyn Fn(usize) + Send + Sync>;

/// Raw memory provider for the virtual machine.
///
/// Implementations hand out 8-byte aligned blocks and signal failure
/// with a null pointer; they never panic. Callers own the returned
/// blocks and must release them with the same size they requested.
pub trait Allocator: Send + Sync {
    /// Allocates `size` bytes, or returns null. Zero-sized requests
    /// are refused.
    fn allocate(&self, size: usize) -> *mut u8;

    /// Resizes a block from `old_size` to `new_size`, preserving the
    /// common prefix. Returns null and leaves the old block intact
    /// when the request cannot be satisfied.
    ///
    /// `ptr` must come from this allocator with exactly `old_size`.
    fn reallocate(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8;

    /// Releases a block. `ptr` must come from this allocator with
    /// exactly `size`; null is ignored.
    fn deallocate(&self, ptr: *mut u8, size: usize);

    /// Notification that an allocation of `requested` bytes failed.
    /// The default implementation does nothing.
    fn notify_out_of_memory(&self, requested: usize) {
        let _ = requested;
    }
}

/// Production allocator backed by `std::alloc`, with running
/// statistics and an optional low-memory hook.
#[derive(Default)]
pub struct SystemAllocator {
    allocated: AtomicUsize,
    allocations: AtomicUsize,
    low_memory_hook: Mutex<Option<LowMemoryHook>>,
}

impl SystemAllocator {
    /// Creates an allocator with empty statistics and no hook.
    pub fn new() -> Self {
        SystemAllocator {
            allocated: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            low_memory_hook: Mutex::new(None),
        }
    }

    /// Installs the hook called when an allocation fails.
    pub fn set_low_memory_hook(&self, hook: LowMemoryHook) {
        *self.low_memory_hook.lock() = Some(hook);
    }

    /// Live bytes currently allocated through this allocator.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of blocks currently live.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let Ok(layout) = Layout::from_size_align(size, DEFAULT_ALIGNMENT) else {
            return ptr::null_mut();
        };
        // SAFETY: layout has non-zero size and valid alignment.
        let block = unsafe { alloc(layout) };
        if !block.is_null() {
            self.allocated.fetch_add(size, Ordering::Relaxed);
            self.allocations.fetch_add(1, Ordering::Relaxed);
        }
        block
    }

    fn reallocate(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        if new_size == 0 {
            return ptr::null_mut();
        }
        let Ok(layout) = Layout::from_size_align(old_size, DEFAULT_ALIGNMENT) else {
            return ptr::null_mut();
        };
        if Layout::from_size_align(new_size, DEFAULT_ALIGNMENT).is_err() {
            return ptr::null_mut();
        }
        // SAFETY: ptr was allocated by this allocator with `layout`,
        // and new_size is a valid non-zero layout size.
        let block = unsafe { realloc(ptr, layout, new_size) };
        if !block.is_null() {
            if new_size >= old_size {
                self.allocated.fetch_add(new_size - old_size, Ordering::Relaxed);
            } else {
                self.allocated.fetch_sub(old_size - new_size, Ordering::Relaxed);
            }
        }
        block
    }

    fn deallocate(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        let Ok(layout) = Layout::from_size_align(size, DEFAULT_ALIGNMENT) else {
            return;
        };
        // SAFETY: ptr was allocated by this allocator with `layout`.
        unsafe { dealloc(ptr, layout) };
        self.allocated.fetch_sub(size, Ordering::Relaxed);
        self.allocations.fetch_sub(1, Ordering::Relaxed);
    }

    fn notify_out_of_memory(&self, requested: usize) {
        if let Some(hook) = self.low_memory_hook.lock().as_ref() {
            hook(requested);
        }
    }
}

/// Allocator that refuses requests once a byte budget is exceeded.
///
/// Wraps a [`SystemAllocator`] for the actual memory; the budget counts
/// live bytes, so releases return headroom.
pub struct LimitedAllocator {
    inner: SystemAllocator,
    limit: usize,
    used: AtomicUsize,
    notified: AtomicBool,
}

impl LimitedAllocator {
    /// Creates an allocator that never holds more than `limit` live
    /// bytes.
    pub fn new(limit: usize) -> Self {
        LimitedAllocator {
            inner: SystemAllocator::new(),
            limit,
            used: AtomicUsize::new(0),
            notified: AtomicBool::new(false),
        }
    }

    /// Live bytes currently drawn from the budget.
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Whether an out-of-memory notification has fired.
    pub fn was_notified(&self) -> bool {
        self.notified.load(Ordering::Relaxed)
    }

    fn reserve(&self, size: usize) -> bool {
        let previous = self.used.fetch_add(size, Ordering::Relaxed);
        if previous + size > self.limit {
            self.used.fetch_sub(size, Ordering::Relaxed);
            return false;
        }
        true
    }
}

impl Allocator for LimitedAllocator {
    fn allocate(&self, size: usize) -> *mut u8 {
        if size == 0 || !self.reserve(size) {
            return ptr::null_mut();
        }
        let block = self.inner.allocate(size);
        if block.is_null() {
            self.used.fetch_sub(size, Ordering::Relaxed);
        }
        block
    }

    fn reallocate(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        if new_size > old_size && !self.reserve(new_size - old_size) {
            return ptr::null_mut();
        }
        let block = self.inner.reallocate(ptr, old_size, new_size);
        if block.is_null() {
            if new_size > old_size {
                self.used.fetch_sub(new_size - old_size, Ordering::Relaxed);
            }
        } else if new_size < old_size {
            self.used.fetch_sub(old_size - new_size, Ordering::Relaxed);
        }
        block
    }

    fn deallocate(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        self.inner.deallocate(ptr, size);
        self.used.fetch_sub(size, Ordering::Relaxed);
    }

    fn notify_out_of_memory(&self, requested: usize) {
        let _ = requested;
        self.notified.store(true, Ordering::Relaxed);
    }
}
