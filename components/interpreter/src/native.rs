//! Bridge between sequences and native Rust callbacks.
//!
//! Intrinsics live in a catalog owned by the [`Program`]. Each entry
//! declares its parameter and result types; the dispatch loop marshals
//! registers into [`NativeValue`]s on the way in and the declared
//! result back into a register on the way out. Marshalling is strict:
//! a type the bridge cannot represent, or a callback returning the
//! wrong type, aborts the call.

use std::collections::HashMap;
use std::fmt;

use builtins::Console;
use core_types::{CType, IntrinsicId, Register, Trap, TrapKind};
use memory_manager::Allocator;

use crate::program::Program;
use crate::vfs::MountTable;

/// Upper bound on declared intrinsic parameters. Calls marshalling
/// more than this abort rather than spilling.
pub const MAX_INTRINSIC_PARAMS: usize = 16;

/// A value crossing the native boundary, in either direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    /// No value; only valid as a result.
    Void,
    /// Boolean, nonzero register means true.
    Bool(bool),
    /// Signed 8-bit integer.
    I8(i8),
    /// Signed 16-bit integer.
    I16(i16),
    /// Signed 32-bit integer.
    I32(i32),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Raw pointer, passed through untouched.
    Ptr(*mut u8),
}

impl NativeValue {
    /// The declared type this value inhabits.
    pub const fn ctype(&self) -> CType {
        match self {
            NativeValue::Void => CType::Void,
            NativeValue::Bool(_) => CType::Bool,
            NativeValue::I8(_) => CType::I8,
            NativeValue::I16(_) => CType::I16,
            NativeValue::I32(_) => CType::I32,
            NativeValue::I64(_) => CType::I64,
            NativeValue::U8(_) => CType::U8,
            NativeValue::U16(_) => CType::U16,
            NativeValue::U32(_) => CType::U32,
            NativeValue::U64(_) => CType::U64,
            NativeValue::F32(_) => CType::F32,
            NativeValue::F64(_) => CType::F64,
            NativeValue::Ptr(_) => CType::Ptr,
        }
    }
}

/// Narrows a register into the native value a parameter declares.
///
/// Integer narrowing truncates raw bits, so a register holding
/// `0xFFFF_FFFF_FFFF_FF05` marshals to `U8(5)`. `Void` and `Any`
/// cannot cross the boundary and abort the call.
pub fn marshal_argument(ctype: CType, register: Register) -> Result<NativeValue, Trap> {
    let value = match ctype {
        CType::Void | CType::Any => {
            return Err(Trap::new(
                TrapKind::InvalidIntrinsicType,
                format!("cannot marshal a parameter of type '{}'", ctype),
            ));
        }
        CType::Bool => NativeValue::Bool(register.as_bool()),
        CType::I8 => NativeValue::I8(register.as_u64() as i8),
        CType::I16 => NativeValue::I16(register.as_u64() as i16),
        CType::I32 => NativeValue::I32(register.as_u64() as i32),
        CType::I64 => NativeValue::I64(register.as_i64()),
        CType::U8 => NativeValue::U8(register.as_u64() as u8),
        CType::U16 => NativeValue::U16(register.as_u64() as u16),
        CType::U32 => NativeValue::U32(register.as_u64() as u32),
        CType::U64 => NativeValue::U64(register.as_u64()),
        CType::F32 => NativeValue::F32(f32::from_bits(register.as_u64() as u32)),
        CType::F64 => NativeValue::F64(register.as_f64()),
        CType::Ptr => NativeValue::Ptr(register.as_ptr()),
    };
    Ok(value)
}

/// Widens a callback result into a register.
///
/// The value must inhabit exactly the declared type. Signed integers
/// sign-extend, unsigned integers zero-extend, and a declared `Void`
/// result produces no register at all.
pub fn marshal_result(value: NativeValue, declared: CType) -> Result<Option<Register>, Trap> {
    if value.ctype() != declared {
        return Err(Trap::new(
            TrapKind::InvalidIntrinsicType,
            format!(
                "intrinsic returned '{}' where '{}' was declared",
                value.ctype(),
                declared
            ),
        ));
    }
    let register = match value {
        NativeValue::Void => return Ok(None),
        NativeValue::Bool(v) => Register::from_bool(v),
        NativeValue::I8(v) => Register::from_i64(v as i64),
        NativeValue::I16(v) => Register::from_i64(v as i64),
        NativeValue::I32(v) => Register::from_i64(v as i64),
        NativeValue::I64(v) => Register::from_i64(v),
        NativeValue::U8(v) => Register::from_u64(v as u64),
        NativeValue::U16(v) => Register::from_u64(v as u64),
        NativeValue::U32(v) => Register::from_u64(v as u64),
        NativeValue::U64(v) => Register::from_u64(v),
        NativeValue::F32(v) => Register::from_u64(v.to_bits() as u64),
        NativeValue::F64(v) => Register::from_f64(v),
        NativeValue::Ptr(v) => Register::from_ptr(v),
    };
    Ok(Some(register))
}

/// Everything a native callback may touch while it runs.
pub struct NativeCallContext<'a> {
    /// Allocator of the executing context.
    pub allocator: &'a dyn Allocator,
    /// Console sink of the executing context.
    pub console: &'a dyn Console,
    /// Program whose sequence triggered the call.
    pub program: &'a Program,
    /// Mount table of the executing context.
    pub vfs: &'a MountTable,
}

/// Native entry point of an intrinsic.
///
/// Arguments arrive already marshalled against the declared parameter
/// list. An `Err` aborts the executing sequence with the message.
pub type IntrinsicCallback =
    fn(&NativeCallContext<'_>, &[NativeValue]) -> Result<NativeValue, String>;

/// One catalog entry: name, signature, and entry point.
pub struct IntrinsicDescriptor {
    /// Dotted name, e.g. `console.out`.
    pub name: String,
    /// Declared parameter types, in push order.
    pub params: Vec<CType>,
    /// Declared result type; `Void` means no register is written.
    pub result: CType,
    /// Native entry point.
    pub callback: IntrinsicCallback,
}

impl fmt::Debug for IntrinsicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrinsicDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("result", &self.result)
            .finish()
    }
}

/// Registry of intrinsics, addressed by dense id or by name.
#[derive(Debug, Default)]
pub struct IntrinsicCatalog {
    entries: Vec<IntrinsicDescriptor>,
    by_name: HashMap<String, IntrinsicId>,
}

impl IntrinsicCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        IntrinsicCatalog {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Adds a descriptor and returns its id.
    ///
    /// Registering a name that already exists replaces the previous
    /// descriptor in place and keeps its id, so sequences compiled
    /// against the old entry keep working.
    pub fn register(&mut self, descriptor: IntrinsicDescriptor) -> IntrinsicId {
        if let Some(&id) = self.by_name.get(&descriptor.name) {
            self.entries[id.0 as usize] = descriptor;
            return id;
        }
        let id = IntrinsicId(self.entries.len() as u32);
        self.by_name.insert(descriptor.name.clone(), id);
        self.entries.push(descriptor);
        id
    }

    /// Looks up a descriptor by id.
    pub fn get(&self, id: IntrinsicId) -> Option<&IntrinsicDescriptor> {
        self.entries.get(id.0 as usize)
    }

    /// Resolves a dotted name to its id.
    pub fn find(&self, name: &str) -> Option<IntrinsicId> {
        self.by_name.get(name).copied()
    }

    /// Number of registered intrinsics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
