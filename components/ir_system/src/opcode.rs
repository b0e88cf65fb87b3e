//! IR opcodes for the Ferrite virtual machine.
//!
//! Three-address, register-based instruction set. Operands are frame
//! register indices ([`Lvid`]) unless a field says otherwise; registers
//! are untyped 8-byte cells and each opcode fixes the interpretation of
//! its operands (unsigned, signed, float or pointer).

use core_types::{AtomId, InstanceId, IntrinsicId, LabelId, Lvid, StrId};

/// One IR instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // Meta
    /// Does nothing.
    Nop,
    /// Declares the frame size; only legal as the first instruction.
    Stacksize {
        /// Number of registers the frame needs, including the reserved
        /// zero register.
        count: u32,
    },
    /// Compiler annotation carried for disassembly; ignored at run time.
    Comment {
        /// Annotation text in the sequence's string table.
        text: StrId,
    },
    /// Lexical scope marker emitted by the compiler; ignored at run time.
    Scope,

    // Moves and immediates
    /// dst := value (raw 64-bit payload).
    LoadImm {
        /// Destination register.
        dst: Lvid,
        /// Raw payload; signed and float immediates are stored as bits.
        value: u64,
    },
    /// dst := src.
    Move {
        /// Destination register.
        dst: Lvid,
        /// Source register.
        src: Lvid,
    },
    /// dst := pointer to a NUL-terminated entry of the string table.
    LoadText {
        /// Destination register.
        dst: Lvid,
        /// String table entry.
        text: StrId,
    },

    // Unsigned arithmetic (wrapping)
    /// dst := a + b (u64).
    Add {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a - b (u64).
    Sub {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a * b (u64).
    Mul {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a / b (u64); zero divisor aborts.
    Div {
        /// Destination register.
        dst: Lvid,
        /// Dividend.
        a: Lvid,
        /// Divisor.
        b: Lvid,
    },
    /// dst := a % b (u64); zero divisor aborts.
    Mod {
        /// Destination register.
        dst: Lvid,
        /// Dividend.
        a: Lvid,
        /// Divisor.
        b: Lvid,
    },

    // Signed arithmetic (wrapping)
    /// dst := a * b (i64).
    Imul {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a / b (i64); zero divisor aborts, `i64::MIN / -1` wraps.
    Idiv {
        /// Destination register.
        dst: Lvid,
        /// Dividend.
        a: Lvid,
        /// Divisor.
        b: Lvid,
    },
    /// dst := a % b (i64); zero divisor aborts.
    Imod {
        /// Destination register.
        dst: Lvid,
        /// Dividend.
        a: Lvid,
        /// Divisor.
        b: Lvid,
    },

    // Float arithmetic
    /// dst := a + b (f64).
    Fadd {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a - b (f64).
    Fsub {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a * b (f64).
    Fmul {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a / b (f64); a `0.0` divisor aborts.
    Fdiv {
        /// Destination register.
        dst: Lvid,
        /// Dividend.
        a: Lvid,
        /// Divisor.
        b: Lvid,
    },

    // Bitwise
    /// dst := a & b.
    And {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a | b.
    Or {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a ^ b.
    Xor {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := 1 if src is zero, else 0.
    Not {
        /// Destination register.
        dst: Lvid,
        /// Source register.
        src: Lvid,
    },

    // Comparisons (dst := 0 or 1)
    /// dst := a == b (raw bits).
    Eq {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a != b (raw bits).
    Neq {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a < b (u64).
    Lt {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a <= b (u64).
    Lte {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a > b (u64).
    Gt {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a >= b (u64).
    Gte {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a < b (i64).
    Ilt {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a <= b (i64).
    Ilte {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a > b (i64).
    Igt {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a >= b (i64).
    Igte {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a < b (f64, NaN compares false).
    Flt {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a <= b (f64, NaN compares false).
    Flte {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a > b (f64, NaN compares false).
    Fgt {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },
    /// dst := a >= b (f64, NaN compares false).
    Fgte {
        /// Destination register.
        dst: Lvid,
        /// Left operand.
        a: Lvid,
        /// Right operand.
        b: Lvid,
    },

    // Control flow
    /// Jump target; raises the label watermark when crossed.
    Label {
        /// Label id, monotonically assigned within a sequence.
        id: LabelId,
    },
    /// Unconditional jump.
    Jmp {
        /// Target label.
        label: LabelId,
    },
    /// Jump when cond is zero.
    Jz {
        /// Condition register.
        cond: Lvid,
        /// Target label.
        label: LabelId,
    },
    /// Jump when cond is non-zero.
    Jnz {
        /// Condition register.
        cond: Lvid,
        /// Target label.
        label: LabelId,
    },
    /// Aborts execution when value is zero.
    Assert {
        /// Register that must be non-zero.
        value: Lvid,
    },
    /// Ends the current frame; src 0 means "no value" and yields 0.
    Ret {
        /// Register holding the return payload.
        src: Lvid,
    },

    // Heap and raw memory
    /// dst := pointer to a fresh block of `size` payload bytes.
    MemAlloc {
        /// Destination register for the block pointer.
        dst: Lvid,
        /// Register holding the payload size in bytes.
        size: Lvid,
    },
    /// ptr := pointer to the block resized from old_size to new_size.
    MemRealloc {
        /// Register holding the block pointer; updated in place.
        ptr: Lvid,
        /// Register holding the current payload size.
        old_size: Lvid,
        /// Register holding the requested payload size.
        new_size: Lvid,
    },
    /// Releases a block; `size` must match the allocation.
    MemFree {
        /// Register holding the block pointer.
        ptr: Lvid,
        /// Register holding the payload size in bytes.
        size: Lvid,
    },
    /// Fills `size` bytes at ptr with a repeated byte pattern.
    MemFill {
        /// Register holding the block pointer.
        ptr: Lvid,
        /// Register holding the span in bytes.
        size: Lvid,
        /// Fill byte (low 8 bits are used).
        pattern: u32,
    },
    /// Copies `size` bytes from src to dst; ranges must not overlap.
    MemCopy {
        /// Register holding the destination pointer.
        dst: Lvid,
        /// Register holding the source pointer.
        src: Lvid,
        /// Register holding the span in bytes.
        size: Lvid,
    },
    /// Copies `size` bytes from src to dst; ranges may overlap.
    MemMove {
        /// Register holding the destination pointer.
        dst: Lvid,
        /// Register holding the source pointer.
        src: Lvid,
        /// Register holding the span in bytes.
        size: Lvid,
    },
    /// dst := -1, 0 or 1 after a bytewise compare of two spans.
    MemCmp {
        /// Destination register for the ordering.
        dst: Lvid,
        /// Register holding the first pointer.
        a: Lvid,
        /// Register holding the second pointer.
        b: Lvid,
        /// Register holding the span in bytes.
        size: Lvid,
    },
    /// dst := length of the NUL-terminated string at ptr.
    CStrLen {
        /// Destination register.
        dst: Lvid,
        /// Register holding the string pointer.
        ptr: Lvid,
    },
    /// dst := zero-extended byte at ptr.
    LoadU8 {
        /// Destination register.
        dst: Lvid,
        /// Register holding the pointer.
        ptr: Lvid,
    },
    /// dst := zero-extended 32-bit load at ptr.
    LoadU32 {
        /// Destination register.
        dst: Lvid,
        /// Register holding the pointer.
        ptr: Lvid,
    },
    /// dst := 64-bit load at ptr.
    LoadU64 {
        /// Destination register.
        dst: Lvid,
        /// Register holding the pointer.
        ptr: Lvid,
    },
    /// Stores the low 8 bits of src at ptr.
    StoreU8 {
        /// Register holding the pointer.
        ptr: Lvid,
        /// Register holding the value.
        src: Lvid,
    },
    /// Stores the low 32 bits of src at ptr.
    StoreU32 {
        /// Register holding the pointer.
        ptr: Lvid,
        /// Register holding the value.
        src: Lvid,
    },
    /// Stores all 64 bits of src at ptr.
    StoreU64 {
        /// Register holding the pointer.
        ptr: Lvid,
        /// Register holding the value.
        src: Lvid,
    },

    // Object fields
    /// dst := 8-byte field `index` of the object at obj.
    FieldGet {
        /// Destination register.
        dst: Lvid,
        /// Register holding the object pointer.
        obj: Lvid,
        /// Zero-based field slot.
        index: u32,
    },
    /// Writes src into 8-byte field `index` of the object at obj.
    FieldSet {
        /// Register holding the object pointer.
        obj: Lvid,
        /// Zero-based field slot.
        index: u32,
        /// Register holding the value.
        src: Lvid,
    },

    // Reference counting
    /// Increments the reference count of the object at ptr.
    Ref {
        /// Register holding the object pointer.
        ptr: Lvid,
    },
    /// Decrements the reference count; at zero runs the destroy
    /// protocol. A count already at zero aborts.
    Unref {
        /// Register holding the object pointer.
        ptr: Lvid,
        /// Atom owning the destructor sequence.
        dtor_atom: AtomId,
        /// Destructor instance; [`InstanceId::NONE`] means no destructor.
        dtor_instance: InstanceId,
    },
    /// Destroys the object at ptr regardless of its reference count.
    Dispose {
        /// Register holding the object pointer.
        ptr: Lvid,
        /// Atom owning the destructor sequence.
        dtor_atom: AtomId,
        /// Destructor instance; [`InstanceId::NONE`] means no destructor.
        dtor_instance: InstanceId,
    },

    // Calls
    /// Appends src to the pending-argument buffer of the next call.
    Push {
        /// Register holding the argument value.
        src: Lvid,
    },
    /// Calls a compiled sequence; dst receives the return payload.
    Call {
        /// Destination register for the result.
        dst: Lvid,
        /// Callee atom.
        atom: AtomId,
        /// Callee sequence instance.
        instance: InstanceId,
    },
    /// Calls a registered native intrinsic; dst receives the result.
    Intrinsic {
        /// Destination register for the result.
        dst: Lvid,
        /// Catalog id of the intrinsic.
        id: IntrinsicId,
    },
}

impl Opcode {
    /// Lower-case mnemonic used by the assembler and disassembler.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Stacksize { .. } => "stacksize",
            Opcode::Comment { .. } => "comment",
            Opcode::Scope => "scope",
            Opcode::LoadImm { .. } => "loadimm",
            Opcode::Move { .. } => "move",
            Opcode::LoadText { .. } => "loadtext",
            Opcode::Add { .. } => "add",
            Opcode::Sub { .. } => "sub",
            Opcode::Mul { .. } => "mul",
            Opcode::Div { .. } => "div",
            Opcode::Mod { .. } => "mod",
            Opcode::Imul { .. } => "imul",
            Opcode::Idiv { .. } => "idiv",
            Opcode::Imod { .. } => "imod",
            Opcode::Fadd { .. } => "fadd",
            Opcode::Fsub { .. } => "fsub",
            Opcode::Fmul { .. } => "fmul",
            Opcode::Fdiv { .. } => "fdiv",
            Opcode::And { .. } => "and",
            Opcode::Or { .. } => "or",
            Opcode::Xor { .. } => "xor",
            Opcode::Not { .. } => "not",
            Opcode::Eq { .. } => "eq",
            Opcode::Neq { .. } => "neq",
            Opcode::Lt { .. } => "lt",
            Opcode::Lte { .. } => "lte",
            Opcode::Gt { .. } => "gt",
            Opcode::Gte { .. } => "gte",
            Opcode::Ilt { .. } => "ilt",
            Opcode::Ilte { .. } => "ilte",
            Opcode::Igt { .. } => "igt",
            Opcode::Igte { .. } => "igte",
            Opcode::Flt { .. } => "flt",
            Opcode::Flte { .. } => "flte",
            Opcode::Fgt { .. } => "fgt",
            Opcode::Fgte { .. } => "fgte",
            Opcode::Label { .. } => "label",
            Opcode::Jmp { .. } => "jmp",
            Opcode::Jz { .. } => "jz",
            Opcode::Jnz { .. } => "jnz",
            Opcode::Assert { .. } => "assert",
            Opcode::Ret { .. } => "ret",
            Opcode::MemAlloc { .. } => "memalloc",
            Opcode::MemRealloc { .. } => "memrealloc",
            Opcode::MemFree { .. } => "memfree",
            Opcode::MemFill { .. } => "memfill",
            Opcode::MemCopy { .. } => "memcopy",
            Opcode::MemMove { .. } => "memmove",
            Opcode::MemCmp { .. } => "memcmp",
            Opcode::CStrLen { .. } => "cstrlen",
            Opcode::LoadU8 { .. } => "loadu8",
            Opcode::LoadU32 { .. } => "loadu32",
            Opcode::LoadU64 { .. } => "loadu64",
            Opcode::StoreU8 { .. } => "storeu8",
            Opcode::StoreU32 { .. } => "storeu32",
            Opcode::StoreU64 { .. } => "storeu64",
            Opcode::FieldGet { .. } => "fieldget",
            Opcode::FieldSet { .. } => "fieldset",
            Opcode::Ref { .. } => "ref",
            Opcode::Unref { .. } => "unref",
            Opcode::Dispose { .. } => "dispose",
            Opcode::Push { .. } => "push",
            Opcode::Call { .. } => "call",
            Opcode::Intrinsic { .. } => "intrinsic",
        }
    }
}
