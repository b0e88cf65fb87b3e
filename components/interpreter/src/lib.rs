//! Register-based virtual machine for Ferrite sequences
//!
//! This crate provides the execution engine on top of `ir_system`:
//! - Chunked register stack with windowed call frames
//! - Dispatch loop covering the full opcode set
//! - Manually refcounted heap objects with destructor dispatch
//! - Diagnostic stacktrace resolved against atom metadata
//! - Native intrinsic bridge with typed argument marshalling
//! - Invocation contexts owning allocator, console, and mount table
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use interpreter::Context;
//! use ir_system::{AtomInfo, Module, Opcode, Sequence};
//! use core_types::{AtomId, InstanceId, Lvid};
//!
//! let mut module = Module::new();
//! let atom = AtomId(1);
//! module.add_atom(atom, AtomInfo::new("add"));
//!
//! let mut seq = Sequence::with_frame_size(4);
//! seq.emit(Opcode::LoadImm { dst: Lvid(1), value: 2 });
//! seq.emit(Opcode::LoadImm { dst: Lvid(2), value: 3 });
//! seq.emit(Opcode::Add { dst: Lvid(3), a: Lvid(1), b: Lvid(2) });
//! seq.emit(Opcode::Ret { src: Lvid(3) });
//! module.add_sequence(atom, InstanceId(0), seq);
//!
//! let mut ctx = Context::new(Arc::new(module));
//! let result = ctx.invoke_atom(atom, &[]).unwrap();
//! assert_eq!(result.as_u64(), 5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod dispatch;
pub mod intrinsics;
pub mod native;
pub mod program;
pub mod register_stack;
pub mod stacktrace;
pub mod vfs;

// Re-export main types at crate root
pub use context::{Context, ContextConfig, CreateHook, TeardownHook};
pub use dispatch::Interpreter;
pub use native::{
    IntrinsicCallback, IntrinsicCatalog, IntrinsicDescriptor, NativeCallContext, NativeValue,
};
pub use program::Program;
pub use register_stack::{RegisterStack, RegisterWindow};
pub use stacktrace::Stacktrace;
pub use vfs::{LocalFilesystem, MemoryFilesystem, Mount, MountTable, VirtualFilesystem};
