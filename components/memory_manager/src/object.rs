//! Heap object layout.
//!
//! Every VM heap block is a reference-count header word followed by the
//! payload. Programs and registers hold the *object pointer* — the
//! first payload byte — while the allocator deals in whole blocks:
//!
//! ```text
//! block start             object pointer
//! v                       v
//! +-----------------------+----------------------------+
//! | refcount (8 bytes)    | payload (declared size)    |
//! +-----------------------+----------------------------+
//! ```
//!
//! The helpers below convert between the two views. They are the only
//! place that knows where the count lives relative to the object.

/// Bytes added in front of every heap allocation for the reference
/// count.
pub const HEADER_SIZE: usize = 8;

/// Byte written over fresh payloads in debug builds.
pub const POISON_ALLOC: u8 = 0xCD;

/// Byte written over released blocks in debug builds.
pub const POISON_FREE: u8 = 0xEF;

/// Converts a block-start pointer to the object pointer handed to
/// programs.
///
/// # Safety
///
/// `block` must point at the start of an allocation of at least
/// `HEADER_SIZE` bytes.
#[inline]
pub unsafe fn object_ptr(block: *mut u8) -> *mut u8 {
    block.add(HEADER_SIZE)
}

/// Converts an object pointer back to the start of its block.
///
/// # Safety
///
/// `obj` must have been produced by [`object_ptr`] for a live block.
#[inline]
pub unsafe fn block_start(obj: *mut u8) -> *mut u8 {
    obj.sub(HEADER_SIZE)
}

/// Reads the reference count of the object at `obj`.
///
/// # Safety
///
/// `obj` must point at the payload of a live block; the count word sits
/// `HEADER_SIZE` bytes in front of it, 8-byte aligned.
#[inline]
pub unsafe fn read_refcount(obj: *const u8) -> u64 {
    obj.sub(HEADER_SIZE).cast::<u64>().read()
}

/// Writes the reference count of the object at `obj`.
///
/// # Safety
///
/// Same contract as [`read_refcount`].
#[inline]
pub unsafe fn write_refcount(obj: *mut u8, count: u64) {
    obj.sub(HEADER_SIZE).cast::<u64>().write(count);
}

/// Pointer to the 8-byte field slot `index` of the object at `obj`.
///
/// # Safety
///
/// `obj` must point at a live payload large enough to contain slot
/// `index`.
#[inline]
pub unsafe fn field_ptr(obj: *mut u8, index: u32) -> *mut u8 {
    obj.add(index as usize * 8)
}
