//! Dispatch loop executing sequences.
//!
//! One [`Interpreter`] drives one execution at a time:
//! - a frame per call, its registers carved from the register stack
//! - a pending-argument buffer filled by `push` and drained by calls
//! - heap opcodes routed through the context's allocator, with every
//!   pointer and size checked when the `memory-checks` feature is on
//! - aborts are fatal: a trap unwinds every frame at once, and the
//!   stacktrace and registers are only torn down after the trap has
//!   been resolved and reported
//!
//! Registers are untyped 8-byte cells; each opcode fixes how its
//! operands are read. Register 0 of every frame is reserved: it reads
//! as zero, and as a call destination it discards the result.

use std::fmt;
use std::ptr;
use std::sync::Arc;

use arrayvec::ArrayVec;

use builtins::Console;
use core_types::{AtomId, InstanceId, IntrinsicId, LabelId, Lvid, Register, Trap, TrapKind};
use ir_system::{Opcode, Sequence};
use memory_manager::{object, Allocator, CheckError, MemoryChecker, TrackedBlock, HEADER_SIZE};

use crate::native::{
    marshal_argument, marshal_result, NativeCallContext, NativeValue, MAX_INTRINSIC_PARAMS,
};
use crate::program::Program;
use crate::register_stack::{RegisterStack, RegisterWindow};
use crate::stacktrace::Stacktrace;
use crate::vfs::MountTable;

/// Default limit on live frames. Hosts executing on small stacks
/// should lower it through their context configuration.
pub const MAX_CALL_DEPTH: usize = 10_000;

/// Limit on arguments pending for a single call.
pub const MAX_PUSHED_ARGS: usize = 32;

/// Execution state of one live frame. Lives on the Rust stack of
/// [`Interpreter::run_call`]; the registers live in the register
/// stack.
struct Frame {
    window: RegisterWindow,
    /// Highest label id crossed so far; directs jump scans.
    watermark: Option<u32>,
}

impl Frame {
    fn load(&self, lvid: Lvid) -> Result<Register, Trap> {
        self.window
            .get(lvid.0)
            .ok_or_else(|| invalid_register(lvid, self.window.len()))
    }

    fn store(&mut self, lvid: Lvid, value: Register) -> Result<(), Trap> {
        self.window
            .set(lvid.0, value)
            .ok_or_else(|| invalid_register(lvid, self.window.len()))
    }

    fn cross_label(&mut self, id: LabelId) {
        self.watermark = Some(self.watermark.map_or(id.0, |w| w.max(id.0)));
    }
}

/// What an executed opcode asks the frame loop to do next.
enum Flow {
    /// Fall through to the following instruction.
    Next,
    /// Continue at an instruction index.
    Jump(usize),
    /// Leave the frame with a payload.
    Return(Register),
}

/// Executes sequences against a program, an allocator, a console and
/// a mount table.
///
/// The interpreter owns no policy of its own: which sequences exist,
/// which intrinsics are callable and where memory comes from are all
/// decided by what it is constructed with.
pub struct Interpreter {
    program: Arc<Program>,
    allocator: Arc<dyn Allocator>,
    console: Arc<dyn Console>,
    vfs: Arc<MountTable>,
    registers: RegisterStack,
    trace: Stacktrace,
    checker: MemoryChecker,
    /// Arguments pushed for the next call or intrinsic.
    pending: Vec<Register>,
    /// Live frames, bounded by `max_depth`.
    depth: usize,
    max_depth: usize,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("registers_used", &self.registers.used())
            .field("trace_depth", &self.trace.depth())
            .field("pending_args", &self.pending.len())
            .field("call_depth", &self.depth)
            .field("tracked_blocks", &self.checker.tracked_count())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Creates an interpreter over a program and the services of its
    /// context.
    pub fn new(
        program: Arc<Program>,
        allocator: Arc<dyn Allocator>,
        console: Arc<dyn Console>,
        vfs: Arc<MountTable>,
    ) -> Self {
        Interpreter {
            program,
            allocator,
            console,
            vfs,
            registers: RegisterStack::new(),
            trace: Stacktrace::new(),
            checker: MemoryChecker::new(),
            pending: Vec::new(),
            depth: 0,
            max_depth: MAX_CALL_DEPTH,
        }
    }

    /// Runs one atom to completion and returns its payload.
    ///
    /// `args` become registers 2.. of the entry frame. On a trap the
    /// stacktrace is resolved into the returned [`Trap`], a report is
    /// written to the console's error stream, the aborted execution's
    /// heap blocks are released, and the interpreter is left ready for
    /// the next invocation.
    pub fn execute(
        &mut self,
        atom: AtomId,
        instance: InstanceId,
        args: &[Register],
    ) -> Result<Register, Trap> {
        self.pending.clear();
        self.pending.extend_from_slice(args);

        match self.run_call(atom, instance) {
            Ok(value) => Ok(value),
            Err(mut trap) => {
                trap.stack = self.trace.resolve(self.program.mapping());
                self.report_trap(&trap);
                // Reclaim the aborted execution's heap and frames; the
                // context stays usable.
                self.checker.purge(self.allocator.as_ref());
                self.registers.reset();
                self.trace.clear();
                self.pending.clear();
                self.depth = 0;
                Err(trap)
            }
        }
    }

    /// The program this interpreter executes.
    pub fn program(&self) -> &Program {
        self.program.as_ref()
    }

    /// The register stack, for inspection.
    pub fn register_stack(&self) -> &RegisterStack {
        &self.registers
    }

    /// The diagnostic call trace, for inspection.
    pub fn stacktrace(&self) -> &Stacktrace {
        &self.trace
    }

    /// Tracked blocks still live, sorted by address. Empty when the
    /// `memory-checks` feature is off.
    pub fn leaks(&self) -> Vec<(usize, TrackedBlock)> {
        self.checker.leaks()
    }

    /// Number of tracked blocks still live.
    pub fn live_block_count(&self) -> usize {
        self.checker.tracked_count()
    }

    /// Payload bytes across all tracked blocks.
    pub fn live_block_bytes(&self) -> usize {
        self.checker.tracked_bytes()
    }

    /// Replaces the call depth limit.
    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    /// Writes one line per leaked block to the console's error stream.
    /// Returns the number of blocks reported.
    pub fn report_leaks(&self) -> usize {
        let leaks = self.checker.leaks();
        if leaks.is_empty() {
            return 0;
        }
        let mapping = self.program.mapping();
        let mut text = format!("leak: {} block(s) still tracked at teardown\n", leaks.len());
        for (address, block) in &leaks {
            let name = mapping
                .info(block.atom)
                .map(|info| info.name.clone())
                .unwrap_or_else(|| block.atom.to_string());
            text.push_str(&format!(
                "  {} bytes at {:#x} allocated in '{}' ({})\n",
                block.size, address, name, block.lvid
            ));
        }
        self.console.write_stderr(&text);
        leaks.len()
    }

    /// Releases every tracked block. Returns how many were freed.
    pub fn purge_heap(&mut self) -> usize {
        self.checker.purge(self.allocator.as_ref())
    }

    fn report_trap(&self, trap: &Trap) {
        let mut text = match trap.opcode_offset {
            Some(offset) => format!(
                "abort ({}) at opcode {}: {}\n",
                trap.kind.label(),
                offset,
                trap
            ),
            None => format!("abort ({}): {}\n", trap.kind.label(), trap),
        };
        for frame in &trap.stack {
            text.push_str(&format!("  at {}\n", frame));
        }
        self.console.write_stderr(&text);
    }

    /// Enters a sequence: sizes a frame, seeds it with the pending
    /// arguments and runs it to completion.
    fn run_call(&mut self, atom: AtomId, instance: InstanceId) -> Result<Register, Trap> {
        if self.depth >= self.max_depth {
            return Err(Trap::new(
                TrapKind::StackOverflow,
                format!("call depth limit of {} frames exceeded", self.max_depth),
            ));
        }

        let program = Arc::clone(&self.program);
        let sequence = program.mapping().sequence(atom, instance).ok_or_else(|| {
            Trap::new(
                TrapKind::UnknownAtom,
                format!("no sequence for {} instance {}", atom, instance.0),
            )
        })?;

        let count = sequence.frame_size().unwrap_or(0) as usize;
        let mut frame = Frame {
            window: self.registers.acquire(count),
            watermark: None,
        };
        if count > 0 {
            // The reserved zero register always reads as zero.
            let _ = frame.window.set(0, Register::ZERO);
        }

        // Pending arguments land at register 2 and up; register 1 is
        // the conventional return slot.
        let args = std::mem::take(&mut self.pending);
        for (i, value) in args.iter().enumerate() {
            let index = Lvid(i as u32 + 2);
            frame.store(index, *value).map_err(|_| {
                Trap::new(
                    TrapKind::InvalidRegister,
                    format!("argument {} does not fit a frame of {} registers", index, count),
                )
            })?;
        }

        self.depth += 1;
        self.trace.push(atom, instance);

        // A trap leaves depth, trace and registers untouched: aborts
        // are fatal and the boundary in `execute` resolves the trace
        // before resetting them.
        let value = self.run_frame(sequence, &mut frame)?;

        self.trace.pop();
        self.depth -= 1;
        self.registers.release(count);
        Ok(value)
    }

    fn run_frame(&mut self, sequence: &Sequence, frame: &mut Frame) -> Result<Register, Trap> {
        let mut cursor = 0;
        while cursor < sequence.instructions.len() {
            let op = sequence.instructions[cursor];
            match self.step(sequence, frame, cursor, op) {
                Ok(Flow::Next) => cursor += 1,
                Ok(Flow::Jump(target)) => cursor = target,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(trap) => {
                    // The innermost frame pins the offset; traps
                    // bubbling through calls keep theirs.
                    return Err(if trap.opcode_offset.is_none() {
                        trap.at(cursor)
                    } else {
                        trap
                    });
                }
            }
        }
        // Falling off the end is an implicit empty return.
        Ok(Register::ZERO)
    }

    fn step(
        &mut self,
        sequence: &Sequence,
        frame: &mut Frame,
        cursor: usize,
        op: Opcode,
    ) -> Result<Flow, Trap> {
        match op {
            // Meta
            Opcode::Nop | Opcode::Scope | Opcode::Comment { .. } => Ok(Flow::Next),
            Opcode::Stacksize { .. } => {
                if cursor == 0 {
                    Ok(Flow::Next)
                } else {
                    Err(Trap::new(
                        TrapKind::UnexpectedOpcode,
                        "stacksize is only legal as the first instruction",
                    ))
                }
            }
            Opcode::Label { id } => {
                frame.cross_label(id);
                Ok(Flow::Next)
            }

            // Moves and immediates
            Opcode::LoadImm { dst, value } => {
                frame.store(dst, Register::from_u64(value))?;
                Ok(Flow::Next)
            }
            Opcode::Move { dst, src } => {
                let value = frame.load(src)?;
                frame.store(dst, value)?;
                Ok(Flow::Next)
            }
            Opcode::LoadText { dst, text } => {
                let bytes = sequence.strings.bytes_with_nul(text).ok_or_else(|| {
                    Trap::new(
                        TrapKind::UnexpectedOpcode,
                        format!("string {} is not in the table", text.0),
                    )
                })?;
                frame.store(dst, Register::from_ptr(bytes.as_ptr() as *mut u8))?;
                Ok(Flow::Next)
            }

            // Unsigned arithmetic
            Opcode::Add { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_u64(x.wrapping_add(y)))?;
                Ok(Flow::Next)
            }
            Opcode::Sub { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_u64(x.wrapping_sub(y)))?;
                Ok(Flow::Next)
            }
            Opcode::Mul { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_u64(x.wrapping_mul(y)))?;
                Ok(Flow::Next)
            }
            Opcode::Div { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                if y == 0 {
                    return Err(division_by_zero());
                }
                frame.store(dst, Register::from_u64(x / y))?;
                Ok(Flow::Next)
            }
            Opcode::Mod { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                if y == 0 {
                    return Err(division_by_zero());
                }
                frame.store(dst, Register::from_u64(x % y))?;
                Ok(Flow::Next)
            }

            // Signed arithmetic
            Opcode::Imul { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                frame.store(dst, Register::from_i64(x.wrapping_mul(y)))?;
                Ok(Flow::Next)
            }
            Opcode::Idiv { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                if y == 0 {
                    return Err(division_by_zero());
                }
                frame.store(dst, Register::from_i64(x.wrapping_div(y)))?;
                Ok(Flow::Next)
            }
            Opcode::Imod { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                if y == 0 {
                    return Err(division_by_zero());
                }
                frame.store(dst, Register::from_i64(x.wrapping_rem(y)))?;
                Ok(Flow::Next)
            }

            // Float arithmetic
            Opcode::Fadd { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_f64(x + y))?;
                Ok(Flow::Next)
            }
            Opcode::Fsub { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_f64(x - y))?;
                Ok(Flow::Next)
            }
            Opcode::Fmul { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_f64(x * y))?;
                Ok(Flow::Next)
            }
            Opcode::Fdiv { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                if y == 0.0 {
                    return Err(division_by_zero());
                }
                frame.store(dst, Register::from_f64(x / y))?;
                Ok(Flow::Next)
            }

            // Bitwise
            Opcode::And { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_u64(x & y))?;
                Ok(Flow::Next)
            }
            Opcode::Or { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_u64(x | y))?;
                Ok(Flow::Next)
            }
            Opcode::Xor { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_u64(x ^ y))?;
                Ok(Flow::Next)
            }
            Opcode::Not { dst, src } => {
                let value = frame.load(src)?.as_u64();
                frame.store(dst, Register::from_bool(value == 0))?;
                Ok(Flow::Next)
            }

            // Comparisons
            Opcode::Eq { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_bool(x == y))?;
                Ok(Flow::Next)
            }
            Opcode::Neq { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_bool(x != y))?;
                Ok(Flow::Next)
            }
            Opcode::Lt { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_bool(x < y))?;
                Ok(Flow::Next)
            }
            Opcode::Lte { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_bool(x <= y))?;
                Ok(Flow::Next)
            }
            Opcode::Gt { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_bool(x > y))?;
                Ok(Flow::Next)
            }
            Opcode::Gte { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_u64(), frame.load(b)?.as_u64());
                frame.store(dst, Register::from_bool(x >= y))?;
                Ok(Flow::Next)
            }
            Opcode::Ilt { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                frame.store(dst, Register::from_bool(x < y))?;
                Ok(Flow::Next)
            }
            Opcode::Ilte { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                frame.store(dst, Register::from_bool(x <= y))?;
                Ok(Flow::Next)
            }
            Opcode::Igt { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                frame.store(dst, Register::from_bool(x > y))?;
                Ok(Flow::Next)
            }
            Opcode::Igte { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_i64(), frame.load(b)?.as_i64());
                frame.store(dst, Register::from_bool(x >= y))?;
                Ok(Flow::Next)
            }
            Opcode::Flt { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_bool(x < y))?;
                Ok(Flow::Next)
            }
            Opcode::Flte { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_bool(x <= y))?;
                Ok(Flow::Next)
            }
            Opcode::Fgt { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_bool(x > y))?;
                Ok(Flow::Next)
            }
            Opcode::Fgte { dst, a, b } => {
                let (x, y) = (frame.load(a)?.as_f64(), frame.load(b)?.as_f64());
                frame.store(dst, Register::from_bool(x >= y))?;
                Ok(Flow::Next)
            }

            // Control flow
            Opcode::Jmp { label } => jump(sequence, frame, cursor, label),
            Opcode::Jz { cond, label } => {
                if frame.load(cond)?.as_u64() == 0 {
                    jump(sequence, frame, cursor, label)
                } else {
                    Ok(Flow::Next)
                }
            }
            Opcode::Jnz { cond, label } => {
                if frame.load(cond)?.as_u64() != 0 {
                    jump(sequence, frame, cursor, label)
                } else {
                    Ok(Flow::Next)
                }
            }
            Opcode::Assert { value } => {
                if frame.load(value)?.as_u64() == 0 {
                    Err(Trap::new(TrapKind::AssertionFailed, "asserted value is zero"))
                } else {
                    Ok(Flow::Next)
                }
            }
            Opcode::Ret { src } => {
                if src.0 == 0 {
                    Ok(Flow::Return(Register::ZERO))
                } else {
                    Ok(Flow::Return(frame.load(src)?))
                }
            }

            // Heap and raw memory
            Opcode::MemAlloc { dst, size } => {
                let payload = frame.load(size)?.as_u64() as usize;
                let obj = self.heap_alloc(payload, dst)?;
                frame.store(dst, Register::from_ptr(obj))?;
                Ok(Flow::Next)
            }
            Opcode::MemRealloc {
                ptr,
                old_size,
                new_size,
            } => {
                let obj = frame.load(ptr)?.as_ptr();
                let old = frame.load(old_size)?.as_u64() as usize;
                let new = frame.load(new_size)?.as_u64() as usize;
                let moved = self.heap_realloc(obj, old, new)?;
                frame.store(ptr, Register::from_ptr(moved))?;
                Ok(Flow::Next)
            }
            Opcode::MemFree { ptr, size } => {
                let obj = frame.load(ptr)?.as_ptr();
                let claimed = frame.load(size)?.as_u64() as usize;
                self.heap_free(obj, claimed)?;
                Ok(Flow::Next)
            }
            Opcode::MemFill { ptr, size, pattern } => {
                let target = frame.load(ptr)?.as_ptr();
                let span = frame.load(size)?.as_u64() as usize;
                self.verify_span(target, span)?;
                // SAFETY: the block contract puts span writable bytes at target.
                unsafe { ptr::write_bytes(target, pattern as u8, span) };
                Ok(Flow::Next)
            }
            Opcode::MemCopy { dst, src, size } => {
                let to = frame.load(dst)?.as_ptr();
                let from = frame.load(src)?.as_ptr();
                let span = frame.load(size)?.as_u64() as usize;
                self.verify_span(to, span)?;
                self.verify_span(from, span)?;
                // SAFETY: both spans are inside their blocks; the opcode
                // forbids overlap.
                unsafe { ptr::copy_nonoverlapping(from as *const u8, to, span) };
                Ok(Flow::Next)
            }
            Opcode::MemMove { dst, src, size } => {
                let to = frame.load(dst)?.as_ptr();
                let from = frame.load(src)?.as_ptr();
                let span = frame.load(size)?.as_u64() as usize;
                self.verify_span(to, span)?;
                self.verify_span(from, span)?;
                // SAFETY: both spans are inside their blocks.
                unsafe { ptr::copy(from as *const u8, to, span) };
                Ok(Flow::Next)
            }
            Opcode::MemCmp { dst, a, b, size } => {
                let left_ptr = frame.load(a)?.as_ptr();
                let right_ptr = frame.load(b)?.as_ptr();
                let span = frame.load(size)?.as_u64() as usize;
                self.verify_span(left_ptr, span)?;
                self.verify_span(right_ptr, span)?;
                // SAFETY: both spans are inside their blocks.
                let ordering = unsafe {
                    let left = std::slice::from_raw_parts(left_ptr as *const u8, span);
                    let right = std::slice::from_raw_parts(right_ptr as *const u8, span);
                    left.cmp(right)
                };
                let value = match ordering {
                    std::cmp::Ordering::Less => -1i64,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                };
                frame.store(dst, Register::from_i64(value))?;
                Ok(Flow::Next)
            }
            Opcode::CStrLen { dst, ptr } => {
                let text = frame.load(ptr)?.as_ptr();
                if text.is_null() {
                    return Err(Trap::new(TrapKind::UnknownPointer, "null string pointer"));
                }
                // String table literals are not tracked blocks, so the
                // checker is deliberately not consulted here.
                // SAFETY: the program contract puts a NUL terminator
                // after text.
                let length = unsafe { std::ffi::CStr::from_ptr(text.cast()) }
                    .to_bytes()
                    .len();
                frame.store(dst, Register::from_u64(length as u64))?;
                Ok(Flow::Next)
            }
            Opcode::LoadU8 { dst, ptr } => {
                let p = frame.load(ptr)?.as_ptr();
                self.verify_access(p, 1)?;
                // SAFETY: one readable byte at p.
                let value = unsafe { p.read() };
                frame.store(dst, Register::from_u64(value as u64))?;
                Ok(Flow::Next)
            }
            Opcode::LoadU32 { dst, ptr } => {
                let p = frame.load(ptr)?.as_ptr();
                self.verify_access(p, 4)?;
                // SAFETY: four readable bytes at p; alignment is not assumed.
                let value = unsafe { p.cast::<u32>().read_unaligned() };
                frame.store(dst, Register::from_u64(value as u64))?;
                Ok(Flow::Next)
            }
            Opcode::LoadU64 { dst, ptr } => {
                let p = frame.load(ptr)?.as_ptr();
                self.verify_access(p, 8)?;
                // SAFETY: eight readable bytes at p; alignment is not assumed.
                let value = unsafe { p.cast::<u64>().read_unaligned() };
                frame.store(dst, Register::from_u64(value))?;
                Ok(Flow::Next)
            }
            Opcode::StoreU8 { ptr, src } => {
                let p = frame.load(ptr)?.as_ptr();
                let value = frame.load(src)?.as_u64();
                self.verify_access(p, 1)?;
                // SAFETY: one writable byte at p.
                unsafe { p.write(value as u8) };
                Ok(Flow::Next)
            }
            Opcode::StoreU32 { ptr, src } => {
                let p = frame.load(ptr)?.as_ptr();
                let value = frame.load(src)?.as_u64();
                self.verify_access(p, 4)?;
                // SAFETY: four writable bytes at p; alignment is not assumed.
                unsafe { p.cast::<u32>().write_unaligned(value as u32) };
                Ok(Flow::Next)
            }
            Opcode::StoreU64 { ptr, src } => {
                let p = frame.load(ptr)?.as_ptr();
                let value = frame.load(src)?.as_u64();
                self.verify_access(p, 8)?;
                // SAFETY: eight writable bytes at p; alignment is not assumed.
                unsafe { p.cast::<u64>().write_unaligned(value) };
                Ok(Flow::Next)
            }

            // Object fields
            Opcode::FieldGet { dst, obj, index } => {
                let p = frame.load(obj)?.as_ptr();
                self.verify_span(p, (index as usize + 1) * 8)?;
                // SAFETY: slot `index` lies inside the span; object
                // payloads are 8-aligned.
                let value = unsafe { object::field_ptr(p, index).cast::<u64>().read() };
                frame.store(dst, Register::from_u64(value))?;
                Ok(Flow::Next)
            }
            Opcode::FieldSet { obj, index, src } => {
                let p = frame.load(obj)?.as_ptr();
                let value = frame.load(src)?.as_u64();
                self.verify_span(p, (index as usize + 1) * 8)?;
                // SAFETY: slot `index` lies inside the span; object
                // payloads are 8-aligned.
                unsafe { object::field_ptr(p, index).cast::<u64>().write(value) };
                Ok(Flow::Next)
            }

            // Reference counting
            Opcode::Ref { ptr } => {
                let obj = frame.load(ptr)?.as_ptr();
                self.verify_object(obj)?;
                // SAFETY: obj is a live object pointer; its count sits
                // in the header word before it.
                unsafe {
                    let count = object::read_refcount(obj);
                    object::write_refcount(obj, count + 1);
                }
                Ok(Flow::Next)
            }
            Opcode::Unref {
                ptr,
                dtor_atom,
                dtor_instance,
            } => {
                let obj = frame.load(ptr)?.as_ptr();
                self.verify_object(obj)?;
                // SAFETY: obj is a live object pointer.
                let count = unsafe { object::read_refcount(obj) };
                if count == 0 {
                    return Err(Trap::new(
                        TrapKind::RefcountUnderflow,
                        format!("unref of {:#x} whose count is already zero", obj as usize),
                    ));
                }
                // SAFETY: as above.
                unsafe { object::write_refcount(obj, count - 1) };
                if count == 1 {
                    self.destroy(obj, dtor_atom, dtor_instance)?;
                }
                Ok(Flow::Next)
            }
            Opcode::Dispose {
                ptr,
                dtor_atom,
                dtor_instance,
            } => {
                let obj = frame.load(ptr)?.as_ptr();
                self.verify_object(obj)?;
                self.destroy(obj, dtor_atom, dtor_instance)?;
                Ok(Flow::Next)
            }

            // Calls
            Opcode::Push { src } => {
                if self.pending.len() >= MAX_PUSHED_ARGS {
                    return Err(Trap::new(
                        TrapKind::TooManyParameters,
                        format!("more than {} arguments pushed for one call", MAX_PUSHED_ARGS),
                    ));
                }
                let value = frame.load(src)?;
                self.pending.push(value);
                Ok(Flow::Next)
            }
            Opcode::Call { dst, atom, instance } => {
                let value = self.run_call(atom, instance)?;
                if dst.0 != 0 {
                    frame.store(dst, value)?;
                }
                Ok(Flow::Next)
            }
            Opcode::Intrinsic { dst, id } => {
                self.call_intrinsic(frame, dst, id)?;
                Ok(Flow::Next)
            }
        }
    }

    /// Allocates a zero-refcount object of `payload` bytes and tracks
    /// it against the allocating atom and destination register.
    fn heap_alloc(&mut self, payload: usize, dst: Lvid) -> Result<*mut u8, Trap> {
        let total = payload
            .checked_add(HEADER_SIZE)
            .ok_or_else(|| allocation_failed(payload))?;
        let block = self.allocator.allocate(total);
        if block.is_null() {
            self.allocator.notify_out_of_memory(total);
            return Err(allocation_failed(payload));
        }

        // SAFETY: block spans HEADER_SIZE + payload writable bytes.
        let obj = unsafe { object::object_ptr(block) };
        // A fresh object has no owners; the program refs it when the
        // pointer is bound.
        // SAFETY: the header word precedes obj inside the block.
        unsafe { object::write_refcount(obj, 0) };
        #[cfg(debug_assertions)]
        unsafe {
            // SAFETY: payload writable bytes follow the header.
            ptr::write_bytes(obj, object::POISON_ALLOC, payload);
        }

        self.checker.track(obj, payload, self.current_atom(), dst);
        Ok(obj)
    }

    fn heap_realloc(&mut self, obj: *mut u8, old: usize, new: usize) -> Result<*mut u8, Trap> {
        self.verify_exact(obj, old)?;
        let total_old = old
            .checked_add(HEADER_SIZE)
            .ok_or_else(|| allocation_failed(old))?;
        let total_new = new
            .checked_add(HEADER_SIZE)
            .ok_or_else(|| allocation_failed(new))?;

        // SAFETY: obj is an object pointer, so its block starts
        // HEADER_SIZE before it.
        let block = unsafe { object::block_start(obj) };
        let moved = self.allocator.reallocate(block, total_old, total_new);
        if moved.is_null() {
            self.allocator.notify_out_of_memory(total_new);
            return Err(allocation_failed(new));
        }

        // SAFETY: moved spans HEADER_SIZE + new writable bytes.
        let new_obj = unsafe { object::object_ptr(moved) };
        self.checker.transfer(obj, new_obj, new);
        Ok(new_obj)
    }

    fn heap_free(&mut self, obj: *mut u8, claimed: usize) -> Result<(), Trap> {
        self.verify_exact(obj, claimed)?;
        #[cfg(debug_assertions)]
        unsafe {
            // SAFETY: claimed matches the block's payload size.
            ptr::write_bytes(obj, object::POISON_FREE, claimed);
        }
        // SAFETY: obj is an object pointer, so its block starts
        // HEADER_SIZE before it.
        let block = unsafe { object::block_start(obj) };
        self.allocator.deallocate(block, claimed + HEADER_SIZE);
        self.checker.untrack(obj);
        Ok(())
    }

    /// Runs the destroy protocol: the declared destructor first, then
    /// release of the block sized from the owning type's metadata.
    fn destroy(
        &mut self,
        obj: *mut u8,
        dtor_atom: AtomId,
        dtor_instance: InstanceId,
    ) -> Result<(), Trap> {
        let program = Arc::clone(&self.program);
        let info = program
            .mapping()
            .info(dtor_atom)
            .ok_or_else(|| Trap::new(TrapKind::UnknownAtom, format!("no metadata for {}", dtor_atom)))?;

        // A destructor atom is declared under the type it destroys; a
        // bare type atom carries its own size.
        let owner = info.parent.unwrap_or(dtor_atom);
        let declared = if owner == dtor_atom {
            info.runtime_size
        } else {
            program
                .mapping()
                .info(owner)
                .ok_or_else(|| {
                    Trap::new(TrapKind::UnknownAtom, format!("no metadata for {}", owner))
                })?
                .runtime_size
        };
        let payload = declared as usize;

        self.verify_exact(obj, payload)?;

        if !dtor_instance.is_none() {
            if program.mapping().sequence(dtor_atom, dtor_instance).is_none() {
                return Err(Trap::new(
                    TrapKind::UnknownAtom,
                    format!(
                        "no destructor sequence for {} instance {}",
                        dtor_atom, dtor_instance.0
                    ),
                ));
            }
            self.pending.clear();
            self.pending.push(Register::from_ptr(obj));
            self.run_call(dtor_atom, dtor_instance)?;
            // The destructor must leave its own block alone; catch it
            // here if it did not.
            self.verify_exact(obj, payload)?;
        }

        #[cfg(debug_assertions)]
        unsafe {
            // SAFETY: payload matches the block's payload size.
            ptr::write_bytes(obj, object::POISON_FREE, payload);
        }
        // SAFETY: obj is an object pointer, so its block starts
        // HEADER_SIZE before it.
        let block = unsafe { object::block_start(obj) };
        self.allocator.deallocate(block, payload + HEADER_SIZE);
        self.checker.untrack(obj);
        Ok(())
    }

    /// Drains the pending arguments into an intrinsic invocation and
    /// writes its result, unless the destination is the discard
    /// register.
    fn call_intrinsic(&mut self, frame: &mut Frame, dst: Lvid, id: IntrinsicId) -> Result<(), Trap> {
        let program = Arc::clone(&self.program);
        let descriptor = program.intrinsics().get(id).ok_or_else(|| {
            Trap::new(
                TrapKind::UnknownIntrinsic,
                format!("intrinsic {} is not registered", id.0),
            )
        })?;

        let args = std::mem::take(&mut self.pending);
        if args.len() != descriptor.params.len() {
            return Err(Trap::new(
                TrapKind::InvalidIntrinsicType,
                format!(
                    "'{}' takes {} arguments, {} were pushed",
                    descriptor.name,
                    descriptor.params.len(),
                    args.len()
                ),
            ));
        }

        let mut values: ArrayVec<NativeValue, MAX_INTRINSIC_PARAMS> = ArrayVec::new();
        for (ctype, register) in descriptor.params.iter().zip(&args) {
            let value = marshal_argument(*ctype, *register)?;
            if values.try_push(value).is_err() {
                return Err(Trap::new(
                    TrapKind::InvalidIntrinsicType,
                    format!(
                        "'{}' declares more than {} parameters",
                        descriptor.name, MAX_INTRINSIC_PARAMS
                    ),
                ));
            }
        }

        let ctx = NativeCallContext {
            allocator: self.allocator.as_ref(),
            console: self.console.as_ref(),
            program: program.as_ref(),
            vfs: self.vfs.as_ref(),
        };
        let result = (descriptor.callback)(&ctx, &values).map_err(|message| {
            Trap::new(
                TrapKind::IntrinsicFailure,
                format!("'{}' failed: {}", descriptor.name, message),
            )
        })?;

        match marshal_result(result, descriptor.result)? {
            Some(value) if dst.0 != 0 => frame.store(dst, value),
            _ => Ok(()),
        }
    }

    fn current_atom(&self) -> AtomId {
        self.trace.entries().last().map_or(AtomId(0), |e| e.atom)
    }

    fn verify_exact(&self, ptr: *const u8, claimed: usize) -> Result<(), Trap> {
        self.checker.verify_exact(ptr, claimed).map_err(checker_trap)
    }

    fn verify_span(&self, ptr: *const u8, span: usize) -> Result<(), Trap> {
        self.checker.verify_span(ptr, span).map_err(checker_trap)
    }

    fn verify_access(&self, ptr: *const u8, width: usize) -> Result<(), Trap> {
        self.checker.verify_access(ptr, width).map_err(checker_trap)
    }

    fn verify_object(&self, ptr: *const u8) -> Result<(), Trap> {
        self.checker.verify_object(ptr).map_err(checker_trap)
    }
}

/// Locates `label` relative to `from`. Label ids are assigned in
/// instruction order, so ids above the watermark lie ahead of the
/// cursor and ids at or below it lie behind.
fn find_label(
    sequence: &Sequence,
    watermark: Option<u32>,
    from: usize,
    label: LabelId,
) -> Option<usize> {
    let is_target =
        |index: &usize| matches!(sequence.instructions[*index], Opcode::Label { id } if id == label);
    let ahead = watermark.map_or(true, |w| label.0 > w);
    if ahead {
        (from..sequence.instructions.len()).find(is_target)
    } else {
        (0..from).rev().find(is_target)
    }
}

fn jump(sequence: &Sequence, frame: &Frame, from: usize, label: LabelId) -> Result<Flow, Trap> {
    match find_label(sequence, frame.watermark, from, label) {
        Some(index) => Ok(Flow::Jump(index)),
        None => Err(Trap::new(
            TrapKind::InvalidLabel,
            format!("{} is not declared in this sequence", label),
        )),
    }
}

fn invalid_register(lvid: Lvid, len: usize) -> Trap {
    Trap::new(
        TrapKind::InvalidRegister,
        format!("{} is outside a frame of {} registers", lvid, len),
    )
}

fn division_by_zero() -> Trap {
    Trap::new(TrapKind::DivisionByZero, "division by zero")
}

fn allocation_failed(payload: usize) -> Trap {
    Trap::new(
        TrapKind::AllocationFailed,
        format!("allocation of {} payload bytes failed", payload),
    )
}

fn checker_trap(error: CheckError) -> Trap {
    let kind = match error {
        CheckError::UnknownPointer { .. } => TrapKind::UnknownPointer,
        CheckError::SizeMismatch { .. } => TrapKind::SizeMismatch,
    };
    Trap::new(kind, error.to_string())
}
