//! Diagnostic call trace maintained by the dispatch loop.
//!
//! The trace is a plain stack of (atom, instance) pairs. It carries no
//! execution state; its only job is to say, at the moment of an abort,
//! which sequences were live. Entries are resolved into printable
//! frames against the program's atom metadata only when a trap is
//! actually reported.

use core_types::{AtomId, InstanceId, StackFrame};
use ir_system::AtomMapping;

/// Entries added to the backing vector per growth step. Calls are
/// frequent; growing in fixed slabs keeps push amortized without
/// doubling into memory the trace never uses.
const GROWTH_INCREMENT: usize = 64;

/// One entry of the trace: which sequence a call entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// Atom of the entered sequence.
    pub atom: AtomId,
    /// Instance selector the call used.
    pub instance: InstanceId,
}

/// Stack of entered calls, outermost first.
#[derive(Debug, Default)]
pub struct Stacktrace {
    entries: Vec<TraceEntry>,
}

impl Stacktrace {
    /// Creates an empty trace without allocating.
    pub fn new() -> Self {
        Stacktrace {
            entries: Vec::new(),
        }
    }

    /// Records entry into a sequence.
    pub fn push(&mut self, atom: AtomId, instance: InstanceId) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve_exact(GROWTH_INCREMENT);
        }
        self.entries.push(TraceEntry { atom, instance });
    }

    /// Records return from the innermost sequence.
    pub fn pop(&mut self) -> Option<TraceEntry> {
        self.entries.pop()
    }

    /// Number of live entries.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// True when no call is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry capacity currently reserved.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Raw entries, outermost first.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Forgets every entry, keeping the reserved capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Resolves the trace into printable frames, innermost first.
    ///
    /// Atoms the mapping does not know render as placeholder frames
    /// rather than being dropped, so the trace depth always matches
    /// what actually ran.
    pub fn resolve(&self, mapping: &dyn AtomMapping) -> Vec<StackFrame> {
        self.entries
            .iter()
            .rev()
            .map(|entry| {
                let info = mapping.info(entry.atom);
                let origin = info.and_then(|i| i.origin.as_ref());
                StackFrame {
                    function_name: info.map(|i| i.name.clone()),
                    source_path: origin.and_then(|o| o.path.clone()),
                    line: origin.map_or(0, |o| o.line),
                    column: origin.map_or(0, |o| o.column),
                    atom: entry.atom,
                    instance: entry.instance,
                }
            })
            .collect()
    }
}
