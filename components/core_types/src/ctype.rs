//! Native calling-convention type tags.
//!
//! When a sequence calls out to a native intrinsic the untyped register
//! payload has to be narrowed to a concrete C-style type. The catalog
//! stores one of these tags per parameter and for the return slot.

use std::fmt;

/// C-style type tag used at the native boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    /// No value. Valid only as a return tag.
    Void,
    /// A type the frontend could not resolve to a concrete C type.
    /// Never marshallable; reaching the boundary with it is a bug in
    /// the emitted IR.
    Any,
    /// One-byte boolean, non-zero meaning true.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Raw pointer.
    Ptr,
}

impl CType {
    /// Whether a register payload can be narrowed to this tag.
    ///
    /// `Void` and `Any` carry no representable value; an argument
    /// declared with either must abort the call before the native
    /// callback runs.
    pub const fn is_marshallable(self) -> bool {
        !matches!(self, CType::Void | CType::Any)
    }

    /// Lower-case name used in diagnostics and catalog dumps.
    pub const fn name(self) -> &'static str {
        match self {
            CType::Void => "void",
            CType::Any => "any",
            CType::Bool => "bool",
            CType::I8 => "i8",
            CType::I16 => "i16",
            CType::I32 => "i32",
            CType::I64 => "i64",
            CType::U8 => "u8",
            CType::U16 => "u16",
            CType::U32 => "u32",
            CType::U64 => "u64",
            CType::F32 => "f32",
            CType::F64 => "f64",
            CType::Ptr => "ptr",
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_and_any_are_not_marshallable() {
        assert!(!CType::Void.is_marshallable());
        assert!(!CType::Any.is_marshallable());
        assert!(CType::U8.is_marshallable());
        assert!(CType::Ptr.is_marshallable());
    }

    #[test]
    fn test_names_are_lower_case() {
        assert_eq!(CType::F32.to_string(), "f32");
        assert_eq!(CType::Ptr.to_string(), "ptr");
    }
}
