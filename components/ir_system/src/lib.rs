//! IR System Component
//!
//! The compiled form of a Ferrite program: the instruction set
//! ([`Opcode`]), immutable instruction sequences with their string
//! tables ([`Sequence`]), atom metadata and lookup ([`AtomInfo`],
//! [`AtomMapping`], [`Module`]) and the binary serialization of both.
//!
//! The compiler produces these tables; the interpreter only reads them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atoms;
pub mod opcode;
pub mod sequence;
mod wire;

pub use atoms::{AtomInfo, AtomMapping, Module};
pub use opcode::Opcode;
pub use sequence::{Sequence, StringTable};
