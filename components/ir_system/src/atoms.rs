//! Atom metadata and program lookup.
//!
//! An *atom* is any named program element the compiler emitted code or
//! layout for: a function, a class, a destructor. The interpreter never
//! owns compiler tables; it reads them through the [`AtomMapping`]
//! trait. [`Module`] is the concrete container produced by the
//! assembler and the module deserializer.

use crate::sequence::Sequence;
use crate::wire;
use core_types::{AtomId, InstanceId, SourceOrigin};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Magic number identifying a serialized module.
const MODULE_MAGIC: &[u8; 4] = b"FMOD";
/// Current module format version.
const MODULE_VERSION: u8 = 1;

/// Compiler-assigned metadata of one atom.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomInfo {
    /// Source-level name.
    pub name: String,
    /// Enclosing atom; a destructor's parent is the type it destroys.
    pub parent: Option<AtomId>,
    /// Size in bytes of one heap instance of this type; 0 for plain
    /// functions.
    pub runtime_size: u64,
    /// Declaration site, for stack traces.
    pub origin: Option<SourceOrigin>,
}

impl AtomInfo {
    /// Creates metadata with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        AtomInfo {
            name: name.into(),
            parent: None,
            runtime_size: 0,
            origin: None,
        }
    }

    /// Sets the enclosing atom.
    pub fn with_parent(mut self, parent: AtomId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the heap instance size.
    pub fn with_runtime_size(mut self, size: u64) -> Self {
        self.runtime_size = size;
        self
    }

    /// Sets the declaration site.
    pub fn with_origin(mut self, origin: SourceOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Read-only view of the compiler's atom tables.
///
/// Shared across execution contexts, so implementations must be safe
/// to read from several threads at once.
pub trait AtomMapping: Send + Sync {
    /// The compiled sequence of one atom instance, if it exists.
    fn sequence(&self, atom: AtomId, instance: InstanceId) -> Option<&Sequence>;

    /// The metadata of an atom, if it exists.
    fn info(&self, atom: AtomId) -> Option<&AtomInfo>;

    /// Resolves a source-level name to an atom id, when the mapping
    /// keeps a name index. The default knows no names.
    fn find(&self, name: &str) -> Option<AtomId> {
        let _ = name;
        None
    }
}

/// A self-contained set of atoms and their compiled sequences.
#[derive(Debug, Clone, Default)]
pub struct Module {
    atoms: HashMap<AtomId, AtomInfo>,
    sequences: HashMap<(AtomId, InstanceId), Sequence>,
}

impl Module {
    /// Creates an empty module.
    pub fn new() -> Self {
        Module {
            atoms: HashMap::new(),
            sequences: HashMap::new(),
        }
    }

    /// Declares an atom; redeclaring an id replaces its metadata.
    pub fn add_atom(&mut self, id: AtomId, info: AtomInfo) {
        self.atoms.insert(id, info);
    }

    /// Attaches the compiled sequence of one atom instance.
    pub fn add_sequence(&mut self, atom: AtomId, instance: InstanceId, seq: Sequence) {
        self.sequences.insert((atom, instance), seq);
    }

    /// Finds an atom by source-level name.
    ///
    /// Names are not required to be unique; when duplicates exist the
    /// lowest atom id wins so the result is deterministic.
    pub fn find_atom(&self, name: &str) -> Option<AtomId> {
        self.atoms
            .iter()
            .filter(|(_, info)| info.name == name)
            .map(|(id, _)| *id)
            .min()
    }

    /// Number of declared atoms.
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Number of attached sequences.
    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Iterates over declared atoms in unspecified order.
    pub fn atoms(&self) -> impl Iterator<Item = (AtomId, &AtomInfo)> {
        self.atoms.iter().map(|(id, info)| (*id, info))
    }

    /// Iterates over attached sequences in unspecified order.
    pub fn sequences(&self) -> impl Iterator<Item = (AtomId, InstanceId, &Sequence)> {
        self.sequences
            .iter()
            .map(|((atom, instance), seq)| (*atom, *instance, seq))
    }

    /// Serializes to the binary module format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(MODULE_MAGIC);
        bytes.push(MODULE_VERSION);

        // Atoms, sorted by id for a stable byte image.
        let mut atom_ids: Vec<AtomId> = self.atoms.keys().copied().collect();
        atom_ids.sort();
        bytes.extend_from_slice(&(atom_ids.len() as u32).to_le_bytes());
        for id in &atom_ids {
            let info = &self.atoms[id];
            bytes.extend_from_slice(&id.0.to_le_bytes());
            wire::write_string(&mut bytes, &info.name);
            match info.parent {
                Some(parent) => {
                    bytes.push(1);
                    bytes.extend_from_slice(&parent.0.to_le_bytes());
                }
                None => bytes.push(0),
            }
            bytes.extend_from_slice(&info.runtime_size.to_le_bytes());
            match &info.origin {
                Some(origin) => {
                    bytes.push(1);
                    wire::write_string(&mut bytes, origin.path.as_deref().unwrap_or(""));
                    bytes.extend_from_slice(&origin.line.to_le_bytes());
                    bytes.extend_from_slice(&origin.column.to_le_bytes());
                }
                None => bytes.push(0),
            }
        }

        // Sequences, sorted by key, each as a length-prefixed blob.
        let mut keys: Vec<(AtomId, InstanceId)> = self.sequences.keys().copied().collect();
        keys.sort();
        bytes.extend_from_slice(&(keys.len() as u32).to_le_bytes());
        for key in &keys {
            let blob = self.sequences[key].to_bytes();
            bytes.extend_from_slice(&key.0 .0.to_le_bytes());
            bytes.extend_from_slice(&key.1 .0.to_le_bytes());
            bytes.extend_from_slice(&(blob.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&blob);
        }

        bytes
    }

    /// Deserializes from the binary module format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let mut offset = 0;

        let magic = wire::read_slice(bytes, &mut offset, 4)?;
        if magic != MODULE_MAGIC {
            return Err("Invalid module magic number".to_string());
        }
        let version = wire::read_u8(bytes, &mut offset)?;
        if version != MODULE_VERSION {
            return Err(format!("Unsupported module version: {}", version));
        }

        let mut module = Module::new();

        let atom_count = wire::read_u32(bytes, &mut offset)? as usize;
        for _ in 0..atom_count {
            let id = AtomId(wire::read_u32(bytes, &mut offset)?);
            let name = wire::read_string(bytes, &mut offset)?;
            let parent = match wire::read_u8(bytes, &mut offset)? {
                0 => None,
                _ => Some(AtomId(wire::read_u32(bytes, &mut offset)?)),
            };
            let runtime_size = wire::read_u64(bytes, &mut offset)?;
            let origin = match wire::read_u8(bytes, &mut offset)? {
                0 => None,
                _ => {
                    let path = wire::read_string(bytes, &mut offset)?;
                    let line = wire::read_u32(bytes, &mut offset)?;
                    let column = wire::read_u32(bytes, &mut offset)?;
                    Some(SourceOrigin {
                        path: if path.is_empty() { None } else { Some(path) },
                        line,
                        column,
                    })
                }
            };
            module.add_atom(
                id,
                AtomInfo {
                    name,
                    parent,
                    runtime_size,
                    origin,
                },
            );
        }

        let seq_count = wire::read_u32(bytes, &mut offset)? as usize;
        for _ in 0..seq_count {
            let atom = AtomId(wire::read_u32(bytes, &mut offset)?);
            let instance = InstanceId(wire::read_u32(bytes, &mut offset)?);
            let len = wire::read_u32(bytes, &mut offset)? as usize;
            let blob = wire::read_slice(bytes, &mut offset, len)?;
            module.add_sequence(atom, instance, Sequence::from_bytes(blob)?);
        }

        Ok(module)
    }

    /// Renders a listing of every sequence, grouped by atom.
    pub fn disassemble(&self) -> String {
        let mut keys: Vec<(AtomId, InstanceId)> = self.sequences.keys().copied().collect();
        keys.sort();

        let mut out = String::new();
        for (atom, instance) in keys {
            let name = self
                .atoms
                .get(&atom)
                .map(|info| info.name.as_str())
                .unwrap_or("<unnamed>");
            let _ = writeln!(out, "; {} ({}, instance {})", name, atom, instance.0);
            let _ = writeln!(out, "func {} {}", atom.0, instance.0);
            out.push_str(&self.sequences[&(atom, instance)].disassemble());
            out.push_str("end\n\n");
        }
        out
    }
}

impl AtomMapping for Module {
    fn sequence(&self, atom: AtomId, instance: InstanceId) -> Option<&Sequence> {
        self.sequences.get(&(atom, instance))
    }

    fn info(&self, atom: AtomId) -> Option<&AtomInfo> {
        self.atoms.get(&atom)
    }

    fn find(&self, name: &str) -> Option<AtomId> {
        self.find_atom(name)
    }
}
