//! Source locations for diagnostics.

use crate::ids::{AtomId, InstanceId};
use std::fmt;

/// Where an atom was declared in its source file.
///
/// Purely diagnostic; execution never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOrigin {
    /// Path of the declaring source file, when known.
    pub path: Option<String>,
    /// 1-based line of the declaration.
    pub line: u32,
    /// 1-based column of the declaration.
    pub column: u32,
}

impl SourceOrigin {
    /// Creates an origin with a known file position.
    pub fn new(path: impl Into<String>, line: u32, column: u32) -> Self {
        SourceOrigin {
            path: Some(path.into()),
            line,
            column,
        }
    }
}

/// One resolved frame of an abort stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the atom, when the mapping knows it.
    pub function_name: Option<String>,
    /// Source file of the atom's declaration, when known.
    pub source_path: Option<String>,
    /// 1-based declaration line, 0 when unknown.
    pub line: u32,
    /// 1-based declaration column, 0 when unknown.
    pub column: u32,
    /// Atom executing in this frame.
    pub atom: AtomId,
    /// Sequence instance executing in this frame.
    pub instance: InstanceId,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function_name.as_deref().unwrap_or("<unknown>");
        match &self.source_path {
            Some(path) => write!(f, "'{}' ({}:{}:{})", name, path, self.line, self.column),
            None => write!(f, "'{}' ({})", name, self.atom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_with_source_renders_position() {
        let frame = StackFrame {
            function_name: Some("main".into()),
            source_path: Some("demo.fe".into()),
            line: 3,
            column: 1,
            atom: AtomId(1),
            instance: InstanceId(0),
        };
        assert_eq!(frame.to_string(), "'main' (demo.fe:3:1)");
    }

    #[test]
    fn test_frame_without_source_falls_back_to_atom() {
        let frame = StackFrame {
            function_name: None,
            source_path: None,
            line: 0,
            column: 0,
            atom: AtomId(9),
            instance: InstanceId(0),
        };
        assert_eq!(frame.to_string(), "'<unknown>' (atom:9)");
    }
}
