//! Instruction sequences and their string tables.
//!
//! A [`Sequence`] is the compiled body of one atom instance: a flat
//! instruction list whose first entry must declare the frame size, plus
//! a table of NUL-terminated strings referenced by id. Sequences are
//! immutable once handed to the interpreter.

use crate::opcode::Opcode;
use crate::wire;
use core_types::{AtomId, InstanceId, IntrinsicId, LabelId, Lvid, StrId};
use std::fmt::Write as _;

/// Magic number identifying a serialized sequence.
const SEQUENCE_MAGIC: &[u8; 4] = b"FSEQ";
/// Current sequence format version.
const SEQUENCE_VERSION: u8 = 1;

/// Table of NUL-terminated strings owned by a sequence.
///
/// Entries keep their terminator so `loadtext` can hand a C-string
/// pointer directly to `cstrlen` and native callbacks. Text containing
/// an interior NUL will be truncated at that NUL by any C-string
/// consumer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringTable {
    entries: Vec<Box<[u8]>>,
}

impl StringTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        StringTable {
            entries: Vec::new(),
        }
    }

    /// Appends a string and returns its id.
    pub fn add(&mut self, text: &str) -> StrId {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        let id = StrId(self.entries.len() as u32);
        self.entries.push(bytes.into_boxed_slice());
        id
    }

    /// Returns the text of an entry without its terminator.
    pub fn get(&self, id: StrId) -> Option<&str> {
        let entry = self.entries.get(id.0 as usize)?;
        std::str::from_utf8(&entry[..entry.len() - 1]).ok()
    }

    /// Returns the raw bytes of an entry, terminator included.
    pub fn bytes_with_nul(&self, id: StrId) -> Option<&[u8]> {
        self.entries.get(id.0 as usize).map(|e| &e[..])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The compiled body of one atom instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    /// Flat instruction list; index 0 must be `Stacksize`.
    pub instructions: Vec<Opcode>,
    /// Strings referenced by `loadtext` and `comment`.
    pub strings: StringTable,
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Sequence {
            instructions: Vec::new(),
            strings: StringTable::new(),
        }
    }

    /// Creates a sequence whose first instruction declares the frame
    /// size.
    pub fn with_frame_size(count: u32) -> Self {
        let mut seq = Sequence::new();
        seq.emit(Opcode::Stacksize { count });
        seq
    }

    /// Appends an instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.instructions.push(op);
    }

    /// Interns a string and returns its id.
    pub fn add_string(&mut self, text: &str) -> StrId {
        self.strings.add(text)
    }

    /// The declared frame size, when the sequence starts with
    /// `Stacksize`.
    pub fn frame_size(&self) -> Option<u32> {
        match self.instructions.first() {
            Some(Opcode::Stacksize { count }) => Some(*count),
            _ => None,
        }
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the sequence has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Serializes to the binary sequence format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(SEQUENCE_MAGIC);
        bytes.push(SEQUENCE_VERSION);

        // String table: count, then length-prefixed raw entries
        // (terminator included).
        bytes.extend_from_slice(&(self.strings.entries.len() as u32).to_le_bytes());
        for entry in &self.strings.entries {
            bytes.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            bytes.extend_from_slice(entry);
        }

        // Instructions: count, then fixed-format records.
        bytes.extend_from_slice(&(self.instructions.len() as u32).to_le_bytes());
        for op in &self.instructions {
            encode_opcode(op, &mut bytes);
        }

        bytes
    }

    /// Deserializes from the binary sequence format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let mut offset = 0;

        let magic = wire::read_slice(bytes, &mut offset, 4)?;
        if magic != SEQUENCE_MAGIC {
            return Err("Invalid sequence magic number".to_string());
        }
        let version = wire::read_u8(bytes, &mut offset)?;
        if version != SEQUENCE_VERSION {
            return Err(format!("Unsupported sequence version: {}", version));
        }

        let string_count = wire::read_u32(bytes, &mut offset)? as usize;
        let mut strings = StringTable::new();
        for _ in 0..string_count {
            let len = wire::read_u32(bytes, &mut offset)? as usize;
            let raw = wire::read_slice(bytes, &mut offset, len)?;
            if raw.last() != Some(&0) {
                return Err("String table entry is not NUL-terminated".to_string());
            }
            if std::str::from_utf8(&raw[..raw.len() - 1]).is_err() {
                return Err("String table entry is not valid UTF-8".to_string());
            }
            strings.entries.push(raw.to_vec().into_boxed_slice());
        }

        let inst_count = wire::read_u32(bytes, &mut offset)? as usize;
        let mut instructions = Vec::with_capacity(inst_count.min(1 << 20));
        for _ in 0..inst_count {
            instructions.push(decode_opcode(bytes, &mut offset)?);
        }

        Ok(Sequence {
            instructions,
            strings,
        })
    }

    /// Renders an aligned listing with offsets and resolved string
    /// operands.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (offset, op) in self.instructions.iter().enumerate() {
            let operands = self.format_operands(op);
            if operands.is_empty() {
                let _ = writeln!(out, "{:04}  {}", offset, op.mnemonic());
            } else {
                let _ = writeln!(out, "{:04}  {:<10} {}", offset, op.mnemonic(), operands);
            }
        }
        out
    }

    fn format_operands(&self, op: &Opcode) -> String {
        let mut s = String::new();
        match *op {
            Opcode::Nop | Opcode::Scope => {}
            Opcode::Stacksize { count } => {
                let _ = write!(s, "{}", count);
            }
            Opcode::Comment { text } => {
                let _ = write!(s, "\"{}\"", escape_text(self.strings.get(text).unwrap_or("?")));
            }
            Opcode::LoadImm { dst, value } => {
                let _ = write!(s, "{}, {}", dst, value);
            }
            Opcode::Move { dst, src } | Opcode::Not { dst, src } => {
                let _ = write!(s, "{}, {}", dst, src);
            }
            Opcode::LoadText { dst, text } => {
                let _ = write!(
                    s,
                    "{}, \"{}\"",
                    dst,
                    escape_text(self.strings.get(text).unwrap_or("?"))
                );
            }
            Opcode::Add { dst, a, b }
            | Opcode::Sub { dst, a, b }
            | Opcode::Mul { dst, a, b }
            | Opcode::Div { dst, a, b }
            | Opcode::Mod { dst, a, b }
            | Opcode::Imul { dst, a, b }
            | Opcode::Idiv { dst, a, b }
            | Opcode::Imod { dst, a, b }
            | Opcode::Fadd { dst, a, b }
            | Opcode::Fsub { dst, a, b }
            | Opcode::Fmul { dst, a, b }
            | Opcode::Fdiv { dst, a, b }
            | Opcode::And { dst, a, b }
            | Opcode::Or { dst, a, b }
            | Opcode::Xor { dst, a, b }
            | Opcode::Eq { dst, a, b }
            | Opcode::Neq { dst, a, b }
            | Opcode::Lt { dst, a, b }
            | Opcode::Lte { dst, a, b }
            | Opcode::Gt { dst, a, b }
            | Opcode::Gte { dst, a, b }
            | Opcode::Ilt { dst, a, b }
            | Opcode::Ilte { dst, a, b }
            | Opcode::Igt { dst, a, b }
            | Opcode::Igte { dst, a, b }
            | Opcode::Flt { dst, a, b }
            | Opcode::Flte { dst, a, b }
            | Opcode::Fgt { dst, a, b }
            | Opcode::Fgte { dst, a, b } => {
                let _ = write!(s, "{}, {}, {}", dst, a, b);
            }
            Opcode::Label { id } => {
                let _ = write!(s, "{}", id);
            }
            Opcode::Jmp { label } => {
                let _ = write!(s, "{}", label);
            }
            Opcode::Jz { cond, label } | Opcode::Jnz { cond, label } => {
                let _ = write!(s, "{}, {}", cond, label);
            }
            Opcode::Assert { value } => {
                let _ = write!(s, "{}", value);
            }
            Opcode::Ret { src } => {
                let _ = write!(s, "{}", src);
            }
            Opcode::MemAlloc { dst, size } => {
                let _ = write!(s, "{}, {}", dst, size);
            }
            Opcode::MemRealloc {
                ptr,
                old_size,
                new_size,
            } => {
                let _ = write!(s, "{}, {}, {}", ptr, old_size, new_size);
            }
            Opcode::MemFree { ptr, size } => {
                let _ = write!(s, "{}, {}", ptr, size);
            }
            Opcode::MemFill { ptr, size, pattern } => {
                let _ = write!(s, "{}, {}, {:#04x}", ptr, size, pattern & 0xFF);
            }
            Opcode::MemCopy { dst, src, size } | Opcode::MemMove { dst, src, size } => {
                let _ = write!(s, "{}, {}, {}", dst, src, size);
            }
            Opcode::MemCmp { dst, a, b, size } => {
                let _ = write!(s, "{}, {}, {}, {}", dst, a, b, size);
            }
            Opcode::CStrLen { dst, ptr }
            | Opcode::LoadU8 { dst, ptr }
            | Opcode::LoadU32 { dst, ptr }
            | Opcode::LoadU64 { dst, ptr } => {
                let _ = write!(s, "{}, {}", dst, ptr);
            }
            Opcode::StoreU8 { ptr, src }
            | Opcode::StoreU32 { ptr, src }
            | Opcode::StoreU64 { ptr, src } => {
                let _ = write!(s, "{}, {}", ptr, src);
            }
            Opcode::FieldGet { dst, obj, index } => {
                let _ = write!(s, "{}, {}, {}", dst, obj, index);
            }
            Opcode::FieldSet { obj, index, src } => {
                let _ = write!(s, "{}, {}, {}", obj, index, src);
            }
            Opcode::Ref { ptr } => {
                let _ = write!(s, "{}", ptr);
            }
            Opcode::Unref {
                ptr,
                dtor_atom,
                dtor_instance,
            }
            | Opcode::Dispose {
                ptr,
                dtor_atom,
                dtor_instance,
            } => {
                let _ = write!(s, "{}, {}, ", ptr, dtor_atom.0);
                if dtor_instance.is_none() {
                    s.push_str("none");
                } else {
                    let _ = write!(s, "{}", dtor_instance.0);
                }
            }
            Opcode::Push { src } => {
                let _ = write!(s, "{}", src);
            }
            Opcode::Call {
                dst,
                atom,
                instance,
            } => {
                let _ = write!(s, "{}, {}, {}", dst, atom.0, instance.0);
            }
            Opcode::Intrinsic { dst, id } => {
                let _ = write!(s, "{}, {}", dst, id.0);
            }
        }
        s
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_three(out: &mut Vec<u8>, tag: u8, x: Lvid, y: Lvid, z: Lvid) {
    out.push(tag);
    put_u32(out, x.0);
    put_u32(out, y.0);
    put_u32(out, z.0);
}

fn encode_opcode(op: &Opcode, out: &mut Vec<u8>) {
    match *op {
        Opcode::Nop => out.push(0),
        Opcode::Stacksize { count } => {
            out.push(1);
            put_u32(out, count);
        }
        Opcode::Comment { text } => {
            out.push(2);
            put_u32(out, text.0);
        }
        Opcode::Scope => out.push(3),
        Opcode::LoadImm { dst, value } => {
            out.push(4);
            put_u32(out, dst.0);
            out.extend_from_slice(&value.to_le_bytes());
        }
        Opcode::Move { dst, src } => {
            out.push(5);
            put_u32(out, dst.0);
            put_u32(out, src.0);
        }
        Opcode::LoadText { dst, text } => {
            out.push(6);
            put_u32(out, dst.0);
            put_u32(out, text.0);
        }
        Opcode::Add { dst, a, b } => put_three(out, 7, dst, a, b),
        Opcode::Sub { dst, a, b } => put_three(out, 8, dst, a, b),
        Opcode::Mul { dst, a, b } => put_three(out, 9, dst, a, b),
        Opcode::Div { dst, a, b } => put_three(out, 10, dst, a, b),
        Opcode::Mod { dst, a, b } => put_three(out, 11, dst, a, b),
        Opcode::Imul { dst, a, b } => put_three(out, 12, dst, a, b),
        Opcode::Idiv { dst, a, b } => put_three(out, 13, dst, a, b),
        Opcode::Imod { dst, a, b } => put_three(out, 14, dst, a, b),
        Opcode::Fadd { dst, a, b } => put_three(out, 15, dst, a, b),
        Opcode::Fsub { dst, a, b } => put_three(out, 16, dst, a, b),
        Opcode::Fmul { dst, a, b } => put_three(out, 17, dst, a, b),
        Opcode::Fdiv { dst, a, b } => put_three(out, 18, dst, a, b),
        Opcode::And { dst, a, b } => put_three(out, 19, dst, a, b),
        Opcode::Or { dst, a, b } => put_three(out, 20, dst, a, b),
        Opcode::Xor { dst, a, b } => put_three(out, 21, dst, a, b),
        Opcode::Not { dst, src } => {
            out.push(22);
            put_u32(out, dst.0);
            put_u32(out, src.0);
        }
        Opcode::Eq { dst, a, b } => put_three(out, 23, dst, a, b),
        Opcode::Neq { dst, a, b } => put_three(out, 24, dst, a, b),
        Opcode::Lt { dst, a, b } => put_three(out, 25, dst, a, b),
        Opcode::Lte { dst, a, b } => put_three(out, 26, dst, a, b),
        Opcode::Gt { dst, a, b } => put_three(out, 27, dst, a, b),
        Opcode::Gte { dst, a, b } => put_three(out, 28, dst, a, b),
        Opcode::Ilt { dst, a, b } => put_three(out, 29, dst, a, b),
        Opcode::Ilte { dst, a, b } => put_three(out, 30, dst, a, b),
        Opcode::Igt { dst, a, b } => put_three(out, 31, dst, a, b),
        Opcode::Igte { dst, a, b } => put_three(out, 32, dst, a, b),
        Opcode::Flt { dst, a, b } => put_three(out, 33, dst, a, b),
        Opcode::Flte { dst, a, b } => put_three(out, 34, dst, a, b),
        Opcode::Fgt { dst, a, b } => put_three(out, 35, dst, a, b),
        Opcode::Fgte { dst, a, b } => put_three(out, 36, dst, a, b),
        Opcode::Label { id } => {
            out.push(37);
            put_u32(out, id.0);
        }
        Opcode::Jmp { label } => {
            out.push(38);
            put_u32(out, label.0);
        }
        Opcode::Jz { cond, label } => {
            out.push(39);
            put_u32(out, cond.0);
            put_u32(out, label.0);
        }
        Opcode::Jnz { cond, label } => {
            out.push(40);
            put_u32(out, cond.0);
            put_u32(out, label.0);
        }
        Opcode::Assert { value } => {
            out.push(41);
            put_u32(out, value.0);
        }
        Opcode::Ret { src } => {
            out.push(42);
            put_u32(out, src.0);
        }
        Opcode::MemAlloc { dst, size } => {
            out.push(43);
            put_u32(out, dst.0);
            put_u32(out, size.0);
        }
        Opcode::MemRealloc {
            ptr,
            old_size,
            new_size,
        } => put_three(out, 44, ptr, old_size, new_size),
        Opcode::MemFree { ptr, size } => {
            out.push(45);
            put_u32(out, ptr.0);
            put_u32(out, size.0);
        }
        Opcode::MemFill { ptr, size, pattern } => {
            out.push(46);
            put_u32(out, ptr.0);
            put_u32(out, size.0);
            put_u32(out, pattern);
        }
        Opcode::MemCopy { dst, src, size } => put_three(out, 47, dst, src, size),
        Opcode::MemMove { dst, src, size } => put_three(out, 48, dst, src, size),
        Opcode::MemCmp { dst, a, b, size } => {
            out.push(49);
            put_u32(out, dst.0);
            put_u32(out, a.0);
            put_u32(out, b.0);
            put_u32(out, size.0);
        }
        Opcode::CStrLen { dst, ptr } => {
            out.push(50);
            put_u32(out, dst.0);
            put_u32(out, ptr.0);
        }
        Opcode::LoadU8 { dst, ptr } => {
            out.push(51);
            put_u32(out, dst.0);
            put_u32(out, ptr.0);
        }
        Opcode::LoadU32 { dst, ptr } => {
            out.push(52);
            put_u32(out, dst.0);
            put_u32(out, ptr.0);
        }
        Opcode::LoadU64 { dst, ptr } => {
            out.push(53);
            put_u32(out, dst.0);
            put_u32(out, ptr.0);
        }
        Opcode::StoreU8 { ptr, src } => {
            out.push(54);
            put_u32(out, ptr.0);
            put_u32(out, src.0);
        }
        Opcode::StoreU32 { ptr, src } => {
            out.push(55);
            put_u32(out, ptr.0);
            put_u32(out, src.0);
        }
        Opcode::StoreU64 { ptr, src } => {
            out.push(56);
            put_u32(out, ptr.0);
            put_u32(out, src.0);
        }
        Opcode::FieldGet { dst, obj, index } => {
            out.push(57);
            put_u32(out, dst.0);
            put_u32(out, obj.0);
            put_u32(out, index);
        }
        Opcode::FieldSet { obj, index, src } => {
            out.push(58);
            put_u32(out, obj.0);
            put_u32(out, index);
            put_u32(out, src.0);
        }
        Opcode::Ref { ptr } => {
            out.push(59);
            put_u32(out, ptr.0);
        }
        Opcode::Unref {
            ptr,
            dtor_atom,
            dtor_instance,
        } => {
            out.push(60);
            put_u32(out, ptr.0);
            put_u32(out, dtor_atom.0);
            put_u32(out, dtor_instance.0);
        }
        Opcode::Dispose {
            ptr,
            dtor_atom,
            dtor_instance,
        } => {
            out.push(61);
            put_u32(out, ptr.0);
            put_u32(out, dtor_atom.0);
            put_u32(out, dtor_instance.0);
        }
        Opcode::Push { src } => {
            out.push(62);
            put_u32(out, src.0);
        }
        Opcode::Call {
            dst,
            atom,
            instance,
        } => {
            out.push(63);
            put_u32(out, dst.0);
            put_u32(out, atom.0);
            put_u32(out, instance.0);
        }
        Opcode::Intrinsic { dst, id } => {
            out.push(64);
            put_u32(out, dst.0);
            put_u32(out, id.0);
        }
    }
}

fn decode_opcode(bytes: &[u8], offset: &mut usize) -> Result<Opcode, String> {
    let tag = wire::read_u8(bytes, offset)?;

    let lvid = |offset: &mut usize| -> Result<Lvid, String> {
        Ok(Lvid(wire::read_u32(bytes, offset)?))
    };

    let op = match tag {
        0 => Opcode::Nop,
        1 => Opcode::Stacksize {
            count: wire::read_u32(bytes, offset)?,
        },
        2 => Opcode::Comment {
            text: StrId(wire::read_u32(bytes, offset)?),
        },
        3 => Opcode::Scope,
        4 => Opcode::LoadImm {
            dst: lvid(offset)?,
            value: wire::read_u64(bytes, offset)?,
        },
        5 => Opcode::Move {
            dst: lvid(offset)?,
            src: lvid(offset)?,
        },
        6 => Opcode::LoadText {
            dst: lvid(offset)?,
            text: StrId(wire::read_u32(bytes, offset)?),
        },
        7 => Opcode::Add {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        8 => Opcode::Sub {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        9 => Opcode::Mul {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        10 => Opcode::Div {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        11 => Opcode::Mod {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        12 => Opcode::Imul {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        13 => Opcode::Idiv {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        14 => Opcode::Imod {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        15 => Opcode::Fadd {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        16 => Opcode::Fsub {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        17 => Opcode::Fmul {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        18 => Opcode::Fdiv {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        19 => Opcode::And {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        20 => Opcode::Or {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        21 => Opcode::Xor {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        22 => Opcode::Not {
            dst: lvid(offset)?,
            src: lvid(offset)?,
        },
        23 => Opcode::Eq {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        24 => Opcode::Neq {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        25 => Opcode::Lt {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        26 => Opcode::Lte {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        27 => Opcode::Gt {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        28 => Opcode::Gte {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        29 => Opcode::Ilt {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        30 => Opcode::Ilte {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        31 => Opcode::Igt {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        32 => Opcode::Igte {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        33 => Opcode::Flt {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        34 => Opcode::Flte {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        35 => Opcode::Fgt {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        36 => Opcode::Fgte {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
        },
        37 => Opcode::Label {
            id: LabelId(wire::read_u32(bytes, offset)?),
        },
        38 => Opcode::Jmp {
            label: LabelId(wire::read_u32(bytes, offset)?),
        },
        39 => Opcode::Jz {
            cond: lvid(offset)?,
            label: LabelId(wire::read_u32(bytes, offset)?),
        },
        40 => Opcode::Jnz {
            cond: lvid(offset)?,
            label: LabelId(wire::read_u32(bytes, offset)?),
        },
        41 => Opcode::Assert {
            value: lvid(offset)?,
        },
        42 => Opcode::Ret {
            src: lvid(offset)?,
        },
        43 => Opcode::MemAlloc {
            dst: lvid(offset)?,
            size: lvid(offset)?,
        },
        44 => Opcode::MemRealloc {
            ptr: lvid(offset)?,
            old_size: lvid(offset)?,
            new_size: lvid(offset)?,
        },
        45 => Opcode::MemFree {
            ptr: lvid(offset)?,
            size: lvid(offset)?,
        },
        46 => Opcode::MemFill {
            ptr: lvid(offset)?,
            size: lvid(offset)?,
            pattern: wire::read_u32(bytes, offset)?,
        },
        47 => Opcode::MemCopy {
            dst: lvid(offset)?,
            src: lvid(offset)?,
            size: lvid(offset)?,
        },
        48 => Opcode::MemMove {
            dst: lvid(offset)?,
            src: lvid(offset)?,
            size: lvid(offset)?,
        },
        49 => Opcode::MemCmp {
            dst: lvid(offset)?,
            a: lvid(offset)?,
            b: lvid(offset)?,
            size: lvid(offset)?,
        },
        50 => Opcode::CStrLen {
            dst: lvid(offset)?,
            ptr: lvid(offset)?,
        },
        51 => Opcode::LoadU8 {
            dst: lvid(offset)?,
            ptr: lvid(offset)?,
        },
        52 => Opcode::LoadU32 {
            dst: lvid(offset)?,
            ptr: lvid(offset)?,
        },
        53 => Opcode::LoadU64 {
            dst: lvid(offset)?,
            ptr: lvid(offset)?,
        },
        54 => Opcode::StoreU8 {
            ptr: lvid(offset)?,
            src: lvid(offset)?,
        },
        55 => Opcode::StoreU32 {
            ptr: lvid(offset)?,
            src: lvid(offset)?,
        },
        56 => Opcode::StoreU64 {
            ptr: lvid(offset)?,
            src: lvid(offset)?,
        },
        57 => Opcode::FieldGet {
            dst: lvid(offset)?,
            obj: lvid(offset)?,
            index: wire::read_u32(bytes, offset)?,
        },
        58 => Opcode::FieldSet {
            obj: lvid(offset)?,
            index: wire::read_u32(bytes, offset)?,
            src: lvid(offset)?,
        },
        59 => Opcode::Ref {
            ptr: lvid(offset)?,
        },
        60 => Opcode::Unref {
            ptr: lvid(offset)?,
            dtor_atom: AtomId(wire::read_u32(bytes, offset)?),
            dtor_instance: InstanceId(wire::read_u32(bytes, offset)?),
        },
        61 => Opcode::Dispose {
            ptr: lvid(offset)?,
            dtor_atom: AtomId(wire::read_u32(bytes, offset)?),
            dtor_instance: InstanceId(wire::read_u32(bytes, offset)?),
        },
        62 => Opcode::Push {
            src: lvid(offset)?,
        },
        63 => Opcode::Call {
            dst: lvid(offset)?,
            atom: AtomId(wire::read_u32(bytes, offset)?),
            instance: InstanceId(wire::read_u32(bytes, offset)?),
        },
        64 => Opcode::Intrinsic {
            dst: lvid(offset)?,
            id: IntrinsicId(wire::read_u32(bytes, offset)?),
        },
        _ => return Err(format!("Unknown opcode tag: {}", tag)),
    };

    Ok(op)
}
