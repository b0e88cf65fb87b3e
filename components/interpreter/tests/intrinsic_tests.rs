//! Tests for intrinsic dispatch and native marshalling
//!
//! Tests cover:
//! - Console built-ins writing through the configured sink
//! - Argument narrowing and result widening across the boundary
//! - Signature violations aborting before the callback runs
//! - Callback failures surfacing as aborts
//! - Native access to the mount table

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use builtins::{CaptureConsole, Color};
use core_types::{AtomId, CType, InstanceId, IntrinsicId, Lvid, TrapKind};
use interpreter::{
    Context, ContextConfig, IntrinsicCatalog, IntrinsicDescriptor, MemoryFilesystem,
    NativeCallContext, NativeValue, Program,
};
use ir_system::{AtomInfo, Module, Opcode, Sequence};

fn truncate(
    _ctx: &NativeCallContext<'_>,
    args: &[NativeValue],
) -> Result<NativeValue, String> {
    match args {
        [NativeValue::U8(v)] => Ok(NativeValue::U64(*v as u64)),
        _ => Err("unexpected arguments".into()),
    }
}

fn double(_ctx: &NativeCallContext<'_>, args: &[NativeValue]) -> Result<NativeValue, String> {
    match args {
        [NativeValue::F64(v)] => Ok(NativeValue::F64(v * 2.0)),
        _ => Err("unexpected arguments".into()),
    }
}

fn boom(_ctx: &NativeCallContext<'_>, _args: &[NativeValue]) -> Result<NativeValue, String> {
    Err("boom".into())
}

fn wrong_result(
    _ctx: &NativeCallContext<'_>,
    _args: &[NativeValue],
) -> Result<NativeValue, String> {
    Ok(NativeValue::Bool(true))
}

static VOID_CALLBACK_RAN: AtomicBool = AtomicBool::new(false);

fn mark_called(
    _ctx: &NativeCallContext<'_>,
    _args: &[NativeValue],
) -> Result<NativeValue, String> {
    VOID_CALLBACK_RAN.store(true, Ordering::SeqCst);
    Ok(NativeValue::Void)
}

fn has_data(ctx: &NativeCallContext<'_>, _args: &[NativeValue]) -> Result<NativeValue, String> {
    Ok(NativeValue::Bool(ctx.vfs.exists("/data/file.txt")))
}

/// Builds a context whose program carries exactly one custom intrinsic
/// and one "main" function running `body`.
fn custom_context(descriptor: IntrinsicDescriptor, frame: u32, body: &[Opcode]) -> Context {
    let mut catalog = IntrinsicCatalog::new();
    catalog.register(descriptor);

    let mut module = Module::new();
    module.add_atom(AtomId(1), AtomInfo::new("main"));
    let mut seq = Sequence::with_frame_size(frame);
    for op in body {
        seq.emit(*op);
    }
    module.add_sequence(AtomId(1), InstanceId(0), seq);

    let program = Program::with_catalog(Arc::new(module), catalog);
    Context::with_program(Arc::new(program), ContextConfig::new())
        .expect("no create hook installed")
}

#[test]
fn test_console_out_writes_the_exact_bytes() {
    // Built-in ids are assigned in registration order; a throwaway
    // program tells us where console.out landed.
    let probe = Program::new(Arc::new(Module::new()));
    let out = probe.intrinsics().find("console.out").unwrap();

    let mut module = Module::new();
    module.add_atom(AtomId(1), AtomInfo::new("main"));
    let mut seq = Sequence::with_frame_size(4);
    let text = seq.add_string("hi");
    seq.emit(Opcode::LoadText {
        dst: Lvid(2),
        text,
    });
    seq.emit(Opcode::Push { src: Lvid(2) });
    seq.emit(Opcode::Intrinsic {
        dst: Lvid(0),
        id: out,
    });
    seq.emit(Opcode::Ret { src: Lvid(0) });
    module.add_sequence(AtomId(1), InstanceId(0), seq);

    let console = Arc::new(CaptureConsole::new());
    let config = ContextConfig::new().with_console(console.clone());
    let mut ctx = Context::with_config(Arc::new(module), config).unwrap();

    ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(console.stdout_output(), "hi");
    assert_eq!(console.stderr_output(), "");
}

#[test]
fn test_console_color_decodes_raw_values() {
    let probe = Program::new(Arc::new(Module::new()));
    let color = probe.intrinsics().find("console.color").unwrap();

    let mut module = Module::new();
    module.add_atom(AtomId(1), AtomInfo::new("main"));
    let mut seq = Sequence::with_frame_size(4);
    seq.emit(Opcode::LoadImm {
        dst: Lvid(2),
        value: 2,
    });
    seq.emit(Opcode::Push { src: Lvid(2) });
    seq.emit(Opcode::Intrinsic {
        dst: Lvid(0),
        id: color,
    });
    seq.emit(Opcode::Ret { src: Lvid(0) });
    module.add_sequence(AtomId(1), InstanceId(0), seq);

    let console = Arc::new(CaptureConsole::new());
    let config = ContextConfig::new().with_console(console.clone());
    let mut ctx = Context::with_config(Arc::new(module), config).unwrap();

    ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(console.color_changes(), vec![Color::Red]);
}

#[test]
fn test_argument_narrowing_truncates_raw_bits() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.truncate".into(),
            params: vec![CType::U8],
            result: CType::U64,
            callback: truncate,
        },
        6,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 0xFFFF_FFFF_FFFF_FF05,
            },
            Opcode::Push { src: Lvid(2) },
            Opcode::Intrinsic {
                dst: Lvid(3),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(3) },
        ],
    );

    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_u64(), 5);
}

#[test]
fn test_f64_round_trips_through_the_boundary() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.double".into(),
            params: vec![CType::F64],
            result: CType::F64,
            callback: double,
        },
        6,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 1.5f64.to_bits(),
            },
            Opcode::Push { src: Lvid(2) },
            Opcode::Intrinsic {
                dst: Lvid(3),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(3) },
        ],
    );

    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_f64(), 3.0);
}

#[test]
fn test_void_parameter_aborts_before_the_callback_runs() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.void_param".into(),
            params: vec![CType::Void],
            result: CType::Void,
            callback: mark_called,
        },
        6,
        &[
            Opcode::Push { src: Lvid(0) },
            Opcode::Intrinsic {
                dst: Lvid(0),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::InvalidIntrinsicType);
    assert!(!VOID_CALLBACK_RAN.load(Ordering::SeqCst));
}

#[test]
fn test_wrong_argument_count_aborts() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.unary".into(),
            params: vec![CType::U64],
            result: CType::Void,
            callback: mark_called,
        },
        4,
        &[
            Opcode::Intrinsic {
                dst: Lvid(0),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::InvalidIntrinsicType);
    assert!(trap.message.contains("takes"));
}

#[test]
fn test_unknown_intrinsic_aborts() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.only".into(),
            params: vec![],
            result: CType::Void,
            callback: mark_called,
        },
        4,
        &[
            Opcode::Intrinsic {
                dst: Lvid(0),
                id: IntrinsicId(99),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::UnknownIntrinsic);
}

#[test]
fn test_callback_failure_surfaces_its_message() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.boom".into(),
            params: vec![],
            result: CType::Void,
            callback: boom,
        },
        4,
        &[
            Opcode::Intrinsic {
                dst: Lvid(0),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::IntrinsicFailure);
    assert!(trap.message.contains("boom"));
}

#[test]
fn test_result_type_mismatch_aborts() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "test.lying".into(),
            params: vec![],
            result: CType::U32,
            callback: wrong_result,
        },
        4,
        &[
            Opcode::Intrinsic {
                dst: Lvid(2),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(2) },
        ],
    );

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::InvalidIntrinsicType);
    assert!(trap.message.contains("returned"));
}

#[test]
fn test_native_callback_reads_the_mount_table() {
    let mut ctx = custom_context(
        IntrinsicDescriptor {
            name: "fs.has_data".into(),
            params: vec![],
            result: CType::Bool,
            callback: has_data,
        },
        4,
        &[
            Opcode::Intrinsic {
                dst: Lvid(2),
                id: IntrinsicId(0),
            },
            Opcode::Ret { src: Lvid(2) },
        ],
    );
    ctx.mount("/data", Arc::new(MemoryFilesystem::new()));

    let before = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert!(!before.as_bool());

    ctx.vfs().write("/data/file.txt", b"payload").unwrap();
    let after = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert!(after.as_bool());
}
