//! Line-oriented assembler for `.fasm` sources.
//!
//! One item per line; `;` starts a comment outside string literals.
//!
//! ```text
//! atom 1 main at=demo.fe:1:1
//! atom 2 cell size=16
//! atom 3 ~cell parent=2
//!
//! func 1 0
//!   stacksize 6
//!   loadimm %2, 30
//!   loadimm %3, 12
//!   add %4, %2, %3
//!   ret %4
//! end
//! ```
//!
//! Registers are written `%N`, labels `@N`, string operands are
//! double-quoted with `\"`, `\\`, `\n` and `\t` escapes, and `none`
//! names the missing destructor instance of `unref`/`dispose`. The
//! `intrinsic` operand may be a raw id or a dotted name resolved
//! against the catalog the module will run with.

use core_types::{AtomId, InstanceId, IntrinsicId, LabelId, Lvid, SourceOrigin};
use interpreter::IntrinsicCatalog;
use ir_system::{AtomInfo, Module, Opcode, Sequence};

use crate::error::CliError;

/// A `func` block under construction.
struct OpenFunc {
    atom: AtomId,
    instance: InstanceId,
    seq: Sequence,
}

/// Assembles a complete source text into a [`Module`].
///
/// Intrinsic names in `intrinsic` instructions are resolved through
/// `intrinsics`, which must match the catalog of the program the
/// module is later executed with.
pub fn assemble(source: &str, intrinsics: &IntrinsicCatalog) -> Result<Module, CliError> {
    let mut module = Module::new();
    let mut open: Option<OpenFunc> = None;
    let mut last_line = 0;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        last_line = line;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }

        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };

        match head {
            "atom" => {
                if open.is_some() {
                    return Err(err(line, "'atom' is not allowed inside a func block"));
                }
                parse_atom(&mut module, rest, line)?;
            }
            "func" => {
                if open.is_some() {
                    return Err(err(line, "'func' before the previous 'end'"));
                }
                open = Some(parse_func(rest, line)?);
            }
            "end" => match open.take() {
                Some(func) => module.add_sequence(func.atom, func.instance, func.seq),
                None => return Err(err(line, "'end' without an open func")),
            },
            mnemonic => match open.as_mut() {
                Some(func) => {
                    let op =
                        parse_instruction(mnemonic, rest, &mut func.seq, intrinsics, line)?;
                    func.seq.emit(op);
                }
                None => {
                    return Err(err(
                        line,
                        format!("instruction '{}' outside a func block", mnemonic),
                    ));
                }
            },
        }
    }

    if open.is_some() {
        return Err(err(last_line, "missing 'end' for the last func"));
    }
    Ok(module)
}

/// `atom <id> <name> [size=N] [parent=M] [at=path:line:col]`
fn parse_atom(module: &mut Module, rest: &str, line: usize) -> Result<(), CliError> {
    let mut tokens = rest.split_whitespace();
    let id = match tokens.next().and_then(|t| t.parse::<u32>().ok()) {
        Some(id) => AtomId(id),
        None => return Err(err(line, "'atom' needs a numeric id")),
    };
    let name = match tokens.next() {
        Some(name) => name,
        None => return Err(err(line, "'atom' needs a name")),
    };

    let mut info = AtomInfo::new(name);
    for attr in tokens {
        if let Some(value) = attr.strip_prefix("size=") {
            info = info.with_runtime_size(unsigned(value, line, "size")?);
        } else if let Some(value) = attr.strip_prefix("parent=") {
            info = info.with_parent(AtomId(small(value, line, "parent")?));
        } else if let Some(value) = attr.strip_prefix("at=") {
            info = info.with_origin(parse_origin(value, line)?);
        } else {
            return Err(err(line, format!("unknown atom attribute '{}'", attr)));
        }
    }
    module.add_atom(id, info);
    Ok(())
}

/// `func <atom> <instance>`
fn parse_func(rest: &str, line: usize) -> Result<OpenFunc, CliError> {
    let mut tokens = rest.split_whitespace();
    let atom = tokens
        .next()
        .and_then(|t| t.parse::<u32>().ok())
        .map(AtomId);
    let inst = tokens.next().map(|t| instance(t, line)).transpose()?;
    match (atom, inst) {
        (Some(atom), Some(inst)) if tokens.next().is_none() => Ok(OpenFunc {
            atom,
            instance: inst,
            seq: Sequence::new(),
        }),
        _ => Err(err(line, "'func' takes an atom id and an instance")),
    }
}

/// `at=path:line:col`, parsed from the right so paths may contain ':'.
fn parse_origin(value: &str, line: usize) -> Result<SourceOrigin, CliError> {
    let mut parts = value.rsplitn(3, ':');
    let column = parts.next().and_then(|t| t.parse::<u32>().ok());
    let source_line = parts.next().and_then(|t| t.parse::<u32>().ok());
    let path = parts.next();
    match (path, source_line, column) {
        (Some(path), Some(source_line), Some(column)) => {
            Ok(SourceOrigin::new(path, source_line, column))
        }
        _ => Err(err(line, "'at' expects path:line:col")),
    }
}

fn parse_instruction(
    mnemonic: &str,
    rest: &str,
    seq: &mut Sequence,
    intrinsics: &IntrinsicCatalog,
    line: usize,
) -> Result<Opcode, CliError> {
    let ops = split_operands(rest);

    let three = |ops: &[&str]| -> Result<(Lvid, Lvid, Lvid), CliError> {
        let [a, b, c] = expect::<3>(ops, line, mnemonic)?;
        Ok((register(a, line)?, register(b, line)?, register(c, line)?))
    };

    let op = match mnemonic {
        "nop" => {
            expect::<0>(&ops, line, mnemonic)?;
            Opcode::Nop
        }
        "scope" => {
            expect::<0>(&ops, line, mnemonic)?;
            Opcode::Scope
        }
        "stacksize" => {
            let [count] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Stacksize {
                count: small(count, line, "count")?,
            }
        }
        "comment" => {
            let [text] = expect::<1>(&ops, line, mnemonic)?;
            let text = seq.add_string(&string_literal(text, line)?);
            Opcode::Comment { text }
        }
        "loadimm" => {
            let [dst, value] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::LoadImm {
                dst: register(dst, line)?,
                value: immediate(value, line)?,
            }
        }
        "move" => {
            let [dst, src] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::Move {
                dst: register(dst, line)?,
                src: register(src, line)?,
            }
        }
        "loadtext" => {
            let [dst, text] = expect::<2>(&ops, line, mnemonic)?;
            let text = seq.add_string(&string_literal(text, line)?);
            Opcode::LoadText {
                dst: register(dst, line)?,
                text,
            }
        }
        "add" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Add { dst, a, b }
        }
        "sub" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Sub { dst, a, b }
        }
        "mul" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Mul { dst, a, b }
        }
        "div" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Div { dst, a, b }
        }
        "mod" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Mod { dst, a, b }
        }
        "imul" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Imul { dst, a, b }
        }
        "idiv" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Idiv { dst, a, b }
        }
        "imod" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Imod { dst, a, b }
        }
        "fadd" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Fadd { dst, a, b }
        }
        "fsub" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Fsub { dst, a, b }
        }
        "fmul" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Fmul { dst, a, b }
        }
        "fdiv" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Fdiv { dst, a, b }
        }
        "and" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::And { dst, a, b }
        }
        "or" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Or { dst, a, b }
        }
        "xor" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Xor { dst, a, b }
        }
        "not" => {
            let [dst, src] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::Not {
                dst: register(dst, line)?,
                src: register(src, line)?,
            }
        }
        "eq" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Eq { dst, a, b }
        }
        "neq" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Neq { dst, a, b }
        }
        "lt" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Lt { dst, a, b }
        }
        "lte" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Lte { dst, a, b }
        }
        "gt" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Gt { dst, a, b }
        }
        "gte" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Gte { dst, a, b }
        }
        "ilt" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Ilt { dst, a, b }
        }
        "ilte" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Ilte { dst, a, b }
        }
        "igt" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Igt { dst, a, b }
        }
        "igte" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Igte { dst, a, b }
        }
        "flt" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Flt { dst, a, b }
        }
        "flte" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Flte { dst, a, b }
        }
        "fgt" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Fgt { dst, a, b }
        }
        "fgte" => {
            let (dst, a, b) = three(&ops)?;
            Opcode::Fgte { dst, a, b }
        }
        "label" => {
            let [id] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Label {
                id: label(id, line)?,
            }
        }
        "jmp" => {
            let [target] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Jmp {
                label: label(target, line)?,
            }
        }
        "jz" => {
            let [cond, target] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::Jz {
                cond: register(cond, line)?,
                label: label(target, line)?,
            }
        }
        "jnz" => {
            let [cond, target] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::Jnz {
                cond: register(cond, line)?,
                label: label(target, line)?,
            }
        }
        "assert" => {
            let [value] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Assert {
                value: register(value, line)?,
            }
        }
        "ret" => {
            let [src] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Ret {
                src: register(src, line)?,
            }
        }
        "memalloc" => {
            let [dst, size] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::MemAlloc {
                dst: register(dst, line)?,
                size: register(size, line)?,
            }
        }
        "memrealloc" => {
            let (ptr, old_size, new_size) = three(&ops)?;
            Opcode::MemRealloc {
                ptr,
                old_size,
                new_size,
            }
        }
        "memfree" => {
            let [ptr, size] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::MemFree {
                ptr: register(ptr, line)?,
                size: register(size, line)?,
            }
        }
        "memfill" => {
            let [ptr, size, pattern] = expect::<3>(&ops, line, mnemonic)?;
            Opcode::MemFill {
                ptr: register(ptr, line)?,
                size: register(size, line)?,
                pattern: small(pattern, line, "pattern")?,
            }
        }
        "memcopy" => {
            let (dst, src, size) = three(&ops)?;
            Opcode::MemCopy { dst, src, size }
        }
        "memmove" => {
            let (dst, src, size) = three(&ops)?;
            Opcode::MemMove { dst, src, size }
        }
        "memcmp" => {
            let [dst, a, b, size] = expect::<4>(&ops, line, mnemonic)?;
            Opcode::MemCmp {
                dst: register(dst, line)?,
                a: register(a, line)?,
                b: register(b, line)?,
                size: register(size, line)?,
            }
        }
        "cstrlen" => {
            let [dst, ptr] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::CStrLen {
                dst: register(dst, line)?,
                ptr: register(ptr, line)?,
            }
        }
        "loadu8" => {
            let [dst, ptr] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::LoadU8 {
                dst: register(dst, line)?,
                ptr: register(ptr, line)?,
            }
        }
        "loadu32" => {
            let [dst, ptr] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::LoadU32 {
                dst: register(dst, line)?,
                ptr: register(ptr, line)?,
            }
        }
        "loadu64" => {
            let [dst, ptr] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::LoadU64 {
                dst: register(dst, line)?,
                ptr: register(ptr, line)?,
            }
        }
        "storeu8" => {
            let [ptr, src] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::StoreU8 {
                ptr: register(ptr, line)?,
                src: register(src, line)?,
            }
        }
        "storeu32" => {
            let [ptr, src] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::StoreU32 {
                ptr: register(ptr, line)?,
                src: register(src, line)?,
            }
        }
        "storeu64" => {
            let [ptr, src] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::StoreU64 {
                ptr: register(ptr, line)?,
                src: register(src, line)?,
            }
        }
        "fieldget" => {
            let [dst, obj, index] = expect::<3>(&ops, line, mnemonic)?;
            Opcode::FieldGet {
                dst: register(dst, line)?,
                obj: register(obj, line)?,
                index: small(index, line, "index")?,
            }
        }
        "fieldset" => {
            let [obj, index, src] = expect::<3>(&ops, line, mnemonic)?;
            Opcode::FieldSet {
                obj: register(obj, line)?,
                index: small(index, line, "index")?,
                src: register(src, line)?,
            }
        }
        "ref" => {
            let [ptr] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Ref {
                ptr: register(ptr, line)?,
            }
        }
        "unref" => {
            let [ptr, atom, dtor] = expect::<3>(&ops, line, mnemonic)?;
            Opcode::Unref {
                ptr: register(ptr, line)?,
                dtor_atom: AtomId(small(atom, line, "atom")?),
                dtor_instance: instance(dtor, line)?,
            }
        }
        "dispose" => {
            let [ptr, atom, dtor] = expect::<3>(&ops, line, mnemonic)?;
            Opcode::Dispose {
                ptr: register(ptr, line)?,
                dtor_atom: AtomId(small(atom, line, "atom")?),
                dtor_instance: instance(dtor, line)?,
            }
        }
        "push" => {
            let [src] = expect::<1>(&ops, line, mnemonic)?;
            Opcode::Push {
                src: register(src, line)?,
            }
        }
        "call" => {
            let [dst, atom, inst] = expect::<3>(&ops, line, mnemonic)?;
            Opcode::Call {
                dst: register(dst, line)?,
                atom: AtomId(small(atom, line, "atom")?),
                instance: instance(inst, line)?,
            }
        }
        "intrinsic" => {
            let [dst, which] = expect::<2>(&ops, line, mnemonic)?;
            Opcode::Intrinsic {
                dst: register(dst, line)?,
                id: intrinsic_ref(which, intrinsics, line)?,
            }
        }
        other => return Err(err(line, format!("unknown mnemonic '{}'", other))),
    };
    Ok(op)
}

/// Drops everything from the first `;` that sits outside a string.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if in_quotes && !escaped => escaped = true,
            '"' if !escaped => {
                in_quotes = !in_quotes;
                escaped = false;
            }
            ';' if !in_quotes => return &line[..i],
            _ => escaped = false,
        }
    }
    line
}

/// Splits an operand list on commas that sit outside strings.
fn split_operands(rest: &str) -> Vec<&str> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            '\\' if in_quotes && !escaped => escaped = true,
            '"' if !escaped => {
                in_quotes = !in_quotes;
                escaped = false;
            }
            ',' if !in_quotes => {
                parts.push(rest[start..i].trim());
                start = i + 1;
                escaped = false;
            }
            _ => escaped = false,
        }
    }
    parts.push(rest[start..].trim());
    parts
}

fn expect<'a, const N: usize>(
    operands: &[&'a str],
    line: usize,
    mnemonic: &str,
) -> Result<[&'a str; N], CliError> {
    operands.try_into().map_err(|_| {
        err(
            line,
            format!(
                "'{}' takes {} operand(s), {} given",
                mnemonic,
                N,
                operands.len()
            ),
        )
    })
}

fn register(token: &str, line: usize) -> Result<Lvid, CliError> {
    token
        .strip_prefix('%')
        .and_then(|n| n.parse::<u32>().ok())
        .map(Lvid)
        .ok_or_else(|| err(line, format!("expected a register like %2, got '{}'", token)))
}

fn label(token: &str, line: usize) -> Result<LabelId, CliError> {
    token
        .strip_prefix('@')
        .and_then(|n| n.parse::<u32>().ok())
        .map(LabelId)
        .ok_or_else(|| err(line, format!("expected a label like @0, got '{}'", token)))
}

/// A raw 64-bit immediate: decimal, `0x` hex, or a negative decimal
/// stored as its two's complement bits.
fn immediate(token: &str, line: usize) -> Result<u64, CliError> {
    let value = if let Some(hex) = token.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if token.starts_with('-') {
        token.parse::<i64>().ok().map(|v| v as u64)
    } else {
        token.parse::<u64>().ok()
    };
    value.ok_or_else(|| err(line, format!("expected a number, got '{}'", token)))
}

fn unsigned(token: &str, line: usize, what: &str) -> Result<u64, CliError> {
    immediate(token, line)
        .map_err(|_| err(line, format!("expected a number for {}, got '{}'", what, token)))
}

fn small(token: &str, line: usize, what: &str) -> Result<u32, CliError> {
    let value = unsigned(token, line, what)?;
    u32::try_from(value)
        .map_err(|_| err(line, format!("{} {} does not fit in 32 bits", what, value)))
}

fn instance(token: &str, line: usize) -> Result<InstanceId, CliError> {
    if token == "none" {
        return Ok(InstanceId::NONE);
    }
    token
        .parse::<u32>()
        .map(InstanceId)
        .map_err(|_| err(line, format!("expected an instance or 'none', got '{}'", token)))
}

fn intrinsic_ref(
    token: &str,
    intrinsics: &IntrinsicCatalog,
    line: usize,
) -> Result<IntrinsicId, CliError> {
    if let Ok(id) = token.parse::<u32>() {
        return Ok(IntrinsicId(id));
    }
    intrinsics
        .find(token)
        .ok_or_else(|| err(line, format!("unknown intrinsic '{}'", token)))
}

fn string_literal(token: &str, line: usize) -> Result<String, CliError> {
    let bytes = token.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'"' || bytes[bytes.len() - 1] != b'"' {
        return Err(err(line, format!("expected a quoted string, got '{}'", token)));
    }

    let mut out = String::with_capacity(token.len());
    let mut escaped = false;
    for c in token[1..token.len() - 1].chars() {
        if escaped {
            match c {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => return Err(err(line, format!("unknown escape '\\{}'", other))),
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    if escaped {
        return Err(err(line, "incomplete escape at the end of a string"));
    }
    Ok(out)
}

fn err(line: usize, message: impl Into<String>) -> CliError {
    CliError::Assembly {
        line,
        message: message.into(),
    }
}
