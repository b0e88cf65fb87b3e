//! The raw register cell.
//!
//! Every virtual register is a single untyped 8-byte cell. The compiler
//! guarantees which interpretation is live at any point, so the cell
//! itself is nothing more than a `u64` with conversion helpers; no tag
//! is stored at runtime.

use std::fmt;

/// One untyped 8-byte register cell.
///
/// An opcode decides how the payload is read: unsigned arithmetic reads
/// it as `u64`, signed arithmetic reinterprets the same bits as `i64`,
/// float arithmetic as an `f64` bit pattern and memory opcodes as a
/// pointer. Conversions are pure bit reinterpretations and never fail.
///
/// # Examples
///
/// ```
/// use core_types::Register;
///
/// let r = Register::from_i64(-1);
/// assert_eq!(r.as_u64(), u64::MAX);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Register(u64);

impl Register {
    /// The all-zero cell, used for the reserved lvid 0 sentinel.
    pub const ZERO: Register = Register(0);

    /// Builds a register from raw unsigned bits.
    pub const fn from_u64(value: u64) -> Self {
        Register(value)
    }

    /// Reads the cell as unsigned bits.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Builds a register from a signed value (two's complement bits).
    pub const fn from_i64(value: i64) -> Self {
        Register(value as u64)
    }

    /// Reinterprets the cell as a signed value.
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Builds a register from a float's IEEE-754 bit pattern.
    pub fn from_f64(value: f64) -> Self {
        Register(value.to_bits())
    }

    /// Reinterprets the cell as a float.
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Builds a register holding a heap pointer.
    pub fn from_ptr(ptr: *mut u8) -> Self {
        Register(ptr as usize as u64)
    }

    /// Reinterprets the cell as a heap pointer.
    pub fn as_ptr(self) -> *mut u8 {
        self.0 as usize as *mut u8
    }

    /// Builds a register from a boolean (1 or 0).
    pub const fn from_bool(value: bool) -> Self {
        Register(value as u64)
    }

    /// Reads the cell as a boolean; any non-zero payload is true.
    pub const fn as_bool(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Register({:#018x})", self.0)
    }
}
