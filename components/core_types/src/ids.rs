//! Identifier newtypes.
//!
//! The IR references everything by dense numeric ids assigned by the
//! compiler. Wrapping them in distinct newtypes keeps an atom id from
//! being confused with a register index or a label at compile time.

use std::fmt;

/// Identifier of a compiled atom (function, class or other program
/// element) inside a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

/// Identifier of one specialized sequence of an atom.
///
/// Generic atoms compile to several sequences, one per instantiation;
/// plain atoms use instance 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// Marker for "no sequence": a destructor slot with this instance
    /// id means the type has no destructor to run.
    pub const NONE: InstanceId = InstanceId(u32::MAX);

    /// Whether this is the [`InstanceId::NONE`] marker.
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Index of a virtual register inside the current call frame.
///
/// Index 0 is the reserved zero sentinel, index 1 holds the callee
/// return value by convention and arguments are copied starting at
/// index 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lvid(pub u32);

/// Identifier of a jump target inside one sequence.
///
/// Labels are numbered monotonically by the compiler, which lets the
/// interpreter resolve a jump with a single directional scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Index into a sequence's string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(pub u32);

/// Identifier of a registered native intrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntrinsicId(pub u32);

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom:{}", self.0)
    }
}

impl fmt::Display for Lvid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_none_marker() {
        assert!(InstanceId::NONE.is_none());
        assert!(!InstanceId(0).is_none());
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(AtomId(7).to_string(), "atom:7");
        assert_eq!(Lvid(3).to_string(), "%3");
        assert_eq!(LabelId(12).to_string(), "@12");
    }
}
