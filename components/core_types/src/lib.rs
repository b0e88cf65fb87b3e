//! Core Types Component
//!
//! Shared vocabulary types for the Ferrite virtual machine: the raw
//! register cell, identifier newtypes, native calling-convention type
//! tags, abort errors and source locations.
//!
//! Every other component depends on this crate and nothing here depends
//! on anything else, so these types define the common language spoken
//! across the IR, the memory subsystem and the interpreter.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ctype;
pub mod error;
pub mod ids;
pub mod register;
pub mod source;

pub use ctype::CType;
pub use error::{Trap, TrapKind};
pub use ids::{AtomId, InstanceId, IntrinsicId, LabelId, Lvid, StrId};
pub use register::Register;
pub use source::{SourceOrigin, StackFrame};
