//! Abort errors.
//!
//! Execution failures in the virtual machine are fatal: there is no
//! in-language catch, so the only job of an error value is to carry a
//! good diagnostic to the invocation boundary. A [`Trap`] holds the
//! failure class, a human-readable message, the opcode offset where
//! execution stopped and the resolved call stack.

use crate::source::StackFrame;
use std::fmt;

/// Classification of a fatal execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    /// The allocator returned null for a requested block.
    AllocationFailed,
    /// Integer division or remainder with a zero divisor.
    DivisionByZero,
    /// A pointer operand does not match any live tracked block.
    UnknownPointer,
    /// A size operand disagrees with the tracked size of its block.
    SizeMismatch,
    /// A jump names a label that does not exist in the sequence.
    InvalidLabel,
    /// An opcode appeared somewhere it is not allowed.
    UnexpectedOpcode,
    /// An intrinsic parameter or return value could not be marshalled.
    InvalidIntrinsicType,
    /// An intrinsic id is not present in the catalog.
    UnknownIntrinsic,
    /// A native callback reported failure.
    IntrinsicFailure,
    /// An `assert` opcode saw a zero value.
    AssertionFailed,
    /// `unref` on an object whose reference count is already zero.
    RefcountUnderflow,
    /// A register index is outside the current frame.
    InvalidRegister,
    /// The call depth limit was exceeded.
    StackOverflow,
    /// More arguments were pushed than a call site can accept.
    TooManyParameters,
    /// An atom or sequence id is not present in the program mapping.
    UnknownAtom,
}

impl TrapKind {
    /// Short stable label used by diagnostics and machine-readable
    /// reports.
    pub const fn label(self) -> &'static str {
        match self {
            TrapKind::AllocationFailed => "allocation-failed",
            TrapKind::DivisionByZero => "division-by-zero",
            TrapKind::UnknownPointer => "unknown-pointer",
            TrapKind::SizeMismatch => "size-mismatch",
            TrapKind::InvalidLabel => "invalid-label",
            TrapKind::UnexpectedOpcode => "unexpected-opcode",
            TrapKind::InvalidIntrinsicType => "invalid-intrinsic-type",
            TrapKind::UnknownIntrinsic => "unknown-intrinsic",
            TrapKind::IntrinsicFailure => "intrinsic-failure",
            TrapKind::AssertionFailed => "assertion-failed",
            TrapKind::RefcountUnderflow => "refcount-underflow",
            TrapKind::InvalidRegister => "invalid-register",
            TrapKind::StackOverflow => "stack-overflow",
            TrapKind::TooManyParameters => "too-many-parameters",
            TrapKind::UnknownAtom => "unknown-atom",
        }
    }
}

/// A fatal execution failure on its way to the invocation boundary.
///
/// Traps are created at the faulting opcode and returned through every
/// active frame without running per-frame cleanup; the interpreter
/// reclaims all frames at once when the trap reaches the boundary. The
/// resolved stack is attached there, where atom names are available.
#[derive(Debug, Clone)]
pub struct Trap {
    /// Failure classification.
    pub kind: TrapKind,
    /// Human-readable description of the failure.
    pub message: String,
    /// Instruction offset inside the innermost sequence, when known.
    pub opcode_offset: Option<usize>,
    /// Resolved call stack, innermost frame first. Filled in at the
    /// invocation boundary.
    pub stack: Vec<StackFrame>,
}

impl Trap {
    /// Creates a trap with no location attached yet.
    pub fn new(kind: TrapKind, message: impl Into<String>) -> Self {
        Trap {
            kind,
            message: message.into(),
            opcode_offset: None,
            stack: Vec::new(),
        }
    }

    /// Attaches the offset of the faulting opcode.
    pub fn at(mut self, offset: usize) -> Self {
        self.opcode_offset = Some(offset);
        self
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.label())
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for Trap {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_message() {
        let t = Trap::new(TrapKind::DivisionByZero, "division by zero");
        assert_eq!(t.to_string(), "division by zero");
    }

    #[test]
    fn test_display_falls_back_to_label() {
        let t = Trap::new(TrapKind::StackOverflow, "");
        assert_eq!(t.to_string(), "stack-overflow");
    }

    #[test]
    fn test_offset_attaches_once() {
        let t = Trap::new(TrapKind::AssertionFailed, "assertion failed").at(12);
        assert_eq!(t.opcode_offset, Some(12));
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(TrapKind::UnknownPointer.label(), "unknown-pointer");
        assert_eq!(TrapKind::RefcountUnderflow.label(), "refcount-underflow");
    }
}
