//! Command line tools for the Ferrite virtual machine.
//!
//! The `ferrite-vm` binary assembles `.fasm` sources, builds and
//! inspects `.fmod` module images, and executes either form. The
//! library half exposes the assembler and the runner so integration
//! tests can drive the same paths without spawning a process.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assemble;
pub mod cli;
pub mod error;
pub mod runner;

pub use assemble::assemble;
pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runner::{load_module, run_module, RunReport};
