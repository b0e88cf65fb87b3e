//! Chunked register stack backing call frames.
//!
//! Frames do not allocate their registers individually. The stack hands
//! each frame a contiguous window carved from the top of the current
//! chunk, and a frame never spans two chunks: when the top chunk cannot
//! fit a request, a fresh chunk is pushed and the window starts there.
//! Chunk buffers are boxed slices, so windows stay valid while the
//! chunk list itself grows.

use core_types::Register;

/// Number of registers in a freshly grown chunk. Frames larger than
/// this get a dedicated chunk sized to the frame.
pub const DEFAULT_CHUNK_CAPACITY: usize = 4096;

/// Fill pattern written into every register of a new window in debug
/// builds, so reads of never-written registers are recognizable.
pub const POISON_REGISTER: u64 = 0xABAB_ABAB_ABAB_ABAB;

/// A contiguous run of registers with a bump cursor.
struct Chunk {
    /// Boxed so the buffer address survives growth of the chunk list.
    buffer: Box<[Register]>,
    /// Registers handed out from the front of the buffer.
    used: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Chunk {
            buffer: vec![Register::ZERO; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.used
    }
}

/// Growable stack of register chunks.
///
/// Frames are acquired and released in strict LIFO order by the
/// dispatch loop. When the top chunk drains completely it is parked as
/// a spare instead of being freed, so call-heavy workloads that bounce
/// across a chunk boundary do not allocate on every call.
pub struct RegisterStack {
    chunks: Vec<Chunk>,
    spare: Option<Chunk>,
}

impl RegisterStack {
    /// Creates an empty stack. No chunk is allocated until the first
    /// frame asks for registers.
    pub fn new() -> Self {
        RegisterStack {
            chunks: Vec::new(),
            spare: None,
        }
    }

    /// Carves a window of `count` registers off the top of the stack.
    ///
    /// A request of zero returns an empty window without touching any
    /// chunk. In debug builds the window is poisoned before it is
    /// returned.
    pub fn acquire(&mut self, count: usize) -> RegisterWindow {
        if count == 0 {
            return RegisterWindow::empty();
        }

        let fits = self.chunks.last().is_some_and(|c| c.remaining() >= count);
        if !fits {
            let chunk = self.take_chunk(count);
            self.chunks.push(chunk);
        }

        let chunk = self
            .chunks
            .last_mut()
            .expect("a chunk with free space was just ensured");
        // SAFETY: used + count <= buffer.len(), so the offset stays in bounds.
        let ptr = unsafe { chunk.buffer.as_mut_ptr().add(chunk.used) };
        chunk.used += count;

        #[cfg(debug_assertions)]
        for i in 0..count {
            // SAFETY: i < count and the region was just reserved.
            unsafe { *ptr.add(i) = Register::from_u64(POISON_REGISTER) };
        }

        RegisterWindow { ptr, len: count }
    }

    /// Picks the chunk a too-large request grows into: the spare if it
    /// is big enough, otherwise a new chunk sized for the request.
    fn take_chunk(&mut self, count: usize) -> Chunk {
        match self.spare.take() {
            Some(chunk) if chunk.buffer.len() >= count => chunk,
            undersized => {
                // An undersized spare stays parked for a later frame.
                self.spare = undersized;
                Chunk::new(count.max(DEFAULT_CHUNK_CAPACITY))
            }
        }
    }

    /// Returns the `count` registers most recently acquired.
    ///
    /// Must mirror `acquire` calls in LIFO order. A drained top chunk
    /// is popped and parked as the spare.
    pub fn release(&mut self, count: usize) {
        if count == 0 {
            return;
        }

        let drained = match self.chunks.last_mut() {
            Some(chunk) => {
                chunk.used = chunk.used.saturating_sub(count);
                chunk.used == 0
            }
            None => false,
        };
        if drained {
            if let Some(chunk) = self.chunks.pop() {
                if self.spare.is_none() {
                    self.spare = Some(chunk);
                }
            }
        }
    }

    /// Drops every live window and keeps at most one chunk as the
    /// spare. Used when an abort unwinds all frames at once.
    pub fn reset(&mut self) {
        if let Some(mut chunk) = self.chunks.pop() {
            chunk.used = 0;
            if self.spare.is_none() {
                self.spare = Some(chunk);
            }
        }
        self.chunks.clear();
    }

    /// Registers currently handed out to live frames.
    pub fn used(&self) -> usize {
        self.chunks.iter().map(|c| c.used).sum()
    }

    /// Registers held across all active chunks, excluding the spare.
    pub fn capacity(&self) -> usize {
        self.chunks.iter().map(|c| c.buffer.len()).sum()
    }

    /// Registers held by the parked spare chunk, if any.
    pub fn spare_capacity(&self) -> usize {
        self.spare.as_ref().map_or(0, |c| c.buffer.len())
    }
}

impl Default for RegisterStack {
    fn default() -> Self {
        RegisterStack::new()
    }
}

/// A frame's view of its registers.
///
/// Indices are frame-local: register 0 is the first register of the
/// window. All access is bounds checked; out-of-range indices report
/// `None` and the dispatch loop turns that into a trap.
#[derive(Clone, Copy)]
pub struct RegisterWindow {
    ptr: *mut Register,
    len: usize,
}

impl RegisterWindow {
    /// Window over no registers, used by frames that declare none.
    pub const fn empty() -> Self {
        RegisterWindow {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Number of registers visible through the window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the window holds no registers.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the register at `index`, or `None` when out of range.
    pub fn get(&self, index: u32) -> Option<Register> {
        if (index as usize) < self.len {
            // SAFETY: index is in bounds and the backing chunk outlives the frame.
            Some(unsafe { *self.ptr.add(index as usize) })
        } else {
            None
        }
    }

    /// Writes the register at `index`, or `None` when out of range.
    pub fn set(&mut self, index: u32, value: Register) -> Option<()> {
        if (index as usize) < self.len {
            // SAFETY: index is in bounds and the backing chunk outlives the frame.
            unsafe { *self.ptr.add(index as usize) = value };
            Some(())
        } else {
            None
        }
    }
}
