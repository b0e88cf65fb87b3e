//! Module Pipeline Integration Tests
//!
//! Follows a program through the full pipeline: assembly text to
//! Module, Module to binary image, image back to Module, and execution
//! of the decoded result. Verifies nothing is lost at any stage.

use std::sync::Arc;

use builtins::CaptureConsole;
use core_types::{AtomId, TrapKind};
use interpreter::intrinsics::install_console_intrinsics;
use interpreter::{Context, ContextConfig, IntrinsicCatalog};
use ir_system::Module;
use vm_cli::assemble;

/// The catalog assembly sources are resolved against.
fn catalog() -> IntrinsicCatalog {
    let mut catalog = IntrinsicCatalog::new();
    install_console_intrinsics(&mut catalog);
    catalog
}

/// Assembles, serializes, and decodes a module in one step.
fn round_trip(source: &str) -> Module {
    let module = assemble(source, &catalog()).expect("assembly failed");
    Module::from_bytes(&module.to_bytes()).expect("decoding failed")
}

/// Test: Assembled programs execute identically after the binary round trip
#[test]
fn test_assemble_serialize_execute() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 5
  loadimm %2, 6
  loadimm %3, 7
  mul %4, %2, %3
  ret %4
end
"#;

    let module = round_trip(source);
    let atom = module.find_atom("main").expect("entry not found");
    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(atom, &[]).expect("invocation failed");
    assert_eq!(result.as_u64(), 42);
}

/// Test: Atom metadata survives serialization
#[test]
fn test_atom_metadata_survives() {
    let source = "atom 1 main\natom 2 cell size=24 parent=1 at=src/lib.fe:10:5\n";
    let module = round_trip(source);

    let (_, info) = module
        .atoms()
        .find(|(id, _)| *id == AtomId(2))
        .expect("atom 2 missing");
    assert_eq!(info.name, "cell");
    assert_eq!(info.runtime_size, 24);
    assert_eq!(info.parent, Some(AtomId(1)));

    let origin = info.origin.as_ref().expect("origin missing");
    assert_eq!(origin.path.as_deref(), Some("src/lib.fe"));
    assert_eq!(origin.line, 10);
    assert_eq!(origin.column, 5);
}

/// Test: String operands survive serialization
#[test]
fn test_string_table_survives() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 3
  loadtext %2, "hello through the pipeline"
  push %2
  intrinsic %0, console.out
  ret %0
end
"#;

    let module = round_trip(source);
    let console = Arc::new(CaptureConsole::new());
    let config = ContextConfig::new().with_console(console.clone());
    let mut ctx = Context::with_config(Arc::new(module), config).unwrap();

    ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");
    assert_eq!(console.stdout_output(), "hello through the pipeline");
}

/// Test: Atom name lookup works on a decoded module
#[test]
fn test_find_atom_after_round_trip() {
    let source = "atom 1 alpha\natom 2 beta\natom 3 gamma\n";
    let module = round_trip(source);

    assert_eq!(module.find_atom("alpha"), Some(AtomId(1)));
    assert_eq!(module.find_atom("beta"), Some(AtomId(2)));
    assert_eq!(module.find_atom("gamma"), Some(AtomId(3)));
    assert_eq!(module.find_atom("delta"), None);
}

/// Test: Abort traces still carry source positions after decoding
#[test]
fn test_trace_origins_survive() {
    let source = r#"
atom 1 main at=demo.fe:3:1

func 1 0
  stacksize 4
  loadimm %2, 9
  div %3, %2, %0
  ret %3
end
"#;

    let module = round_trip(source);
    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();

    assert_eq!(trap.kind, TrapKind::DivisionByZero);
    let frame = &trap.stack[0];
    assert_eq!(frame.function_name.as_deref(), Some("main"));
    assert_eq!(frame.source_path.as_deref(), Some("demo.fe"));
    assert_eq!(frame.line, 3);
    assert_eq!(frame.column, 1);
}

/// Test: The disassembly lists every function with its header
#[test]
fn test_disassembly_lists_functions() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 5
  loadimm %2, 30
  loadimm %3, 12
  add %4, %2, %3
  ret %4
end
"#;

    let listing = round_trip(source).disassemble();
    assert!(listing.contains("; main (atom:1, instance 0)"));
    assert!(listing.contains("func 1 0"));
    assert!(listing.contains("stacksize"));
    assert!(listing.contains("add"));
    assert!(listing.contains("end"));
}
