//! Host-facing built-in services for the Ferrite virtual machine.
//!
//! This crate provides the console surface that programs reach through
//! native intrinsics:
//! - the `Console` trait, implemented by embedders
//! - `StdoutConsole`, the default process-stdio console with ANSI colors
//! - `CaptureConsole`, a thread-safe capture buffer for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod console;

// Re-export main types for convenience
pub use console::{CaptureConsole, Color, Console, StdoutConsole};
