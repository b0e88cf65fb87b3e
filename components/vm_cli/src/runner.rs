//! Loading and executing module images.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use interpreter::intrinsics::install_console_intrinsics;
use interpreter::{Context, IntrinsicCatalog};
use ir_system::Module;
use serde::Serialize;

use crate::assemble::assemble;
use crate::error::{CliError, CliResult};

/// The outcome of a completed run, printable as text or JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the atom that was invoked.
    pub entry: String,
    /// Raw bits left in the entry function's return register.
    pub result: u64,
    /// Heap blocks still live after the entry function returned.
    pub leaked_blocks: usize,
}

/// Reads a module from disk.
///
/// A `.fasm` path is assembled against the built-in console catalog;
/// any other path is decoded as a binary `.fmod` image.
pub fn load_module(path: &Path) -> CliResult<Module> {
    if path.extension().map_or(false, |ext| ext == "fasm") {
        let source = fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut catalog = IntrinsicCatalog::new();
        install_console_intrinsics(&mut catalog);
        assemble(&source, &catalog)
    } else {
        let bytes = fs::read(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Module::from_bytes(&bytes).map_err(CliError::ModuleFormat)
    }
}

/// Executes `entry` with no arguments and reports the outcome.
///
/// A trap surfaces as [`CliError::Aborted`] after the interpreter has
/// already written its diagnostic to stderr.
pub fn run_module(module: Module, entry: &str) -> CliResult<RunReport> {
    let atom = module
        .find_atom(entry)
        .ok_or_else(|| CliError::MissingEntry(entry.to_string()))?;
    let mut context = Context::new(Arc::new(module));
    let result = context.invoke_atom(atom, &[])?;
    Ok(RunReport {
        entry: entry.to_string(),
        result: result.as_u64(),
        leaked_blocks: context.live_block_count(),
    })
}
