//! End-to-End CLI Integration Tests
//!
//! Drives the vm_cli library through the same paths the ferrite-vm
//! binary takes: source file to module, module to binary artifact, and
//! artifact to executed result.

use std::fs;

use core_types::TrapKind;
use vm_cli::{load_module, run_module, CliError};

/// A two-function program: main pushes 21 and calls double.
const CALLER: &str = r#"
atom 1 main
atom 2 double

func 1 0
  stacksize 4
  loadimm %2, 21
  push %2
  call %3, 2, 0
  ret %3
end

func 2 0
  stacksize 4
  add %3, %2, %2
  ret %3
end
"#;

/// Test: Assemble a source file and run it
#[test]
fn test_e2e_assemble_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.fasm");
    fs::write(&path, CALLER).unwrap();

    let report = run_module(load_module(&path).unwrap(), "main").unwrap();

    assert_eq!(report.entry, "main");
    assert_eq!(report.result, 42);
    assert_eq!(report.leaked_blocks, 0);
}

/// Test: Build a binary artifact, then run the artifact
#[test]
fn test_e2e_build_then_run_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("prog.fasm");
    let artifact_path = dir.path().join("prog.fmod");
    fs::write(&source_path, CALLER).unwrap();

    // The --build mode: assemble and write the serialized image.
    let module = load_module(&source_path).unwrap();
    fs::write(&artifact_path, module.to_bytes()).unwrap();

    // The --run mode on the artifact.
    let report = run_module(load_module(&artifact_path).unwrap(), "main").unwrap();
    assert_eq!(report.result, 42);
}

/// Test: The disassembly of a loaded module lists its functions
#[test]
fn test_e2e_disasm_listing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.fasm");
    fs::write(&path, CALLER).unwrap();

    let listing = load_module(&path).unwrap().disassemble();

    assert!(listing.contains("; main (atom:1, instance 0)"));
    assert!(listing.contains("; double (atom:2, instance 0)"));
    assert!(listing.contains("call"));
    assert!(listing.contains("end"));
}

/// Test: An alternate entry atom can be selected by name
#[test]
fn test_e2e_custom_entry() {
    let source = r#"
atom 1 main
atom 2 other

func 1 0
  stacksize 3
  loadimm %2, 1
  ret %2
end

func 2 0
  stacksize 3
  loadimm %2, 7
  ret %2
end
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.fasm");
    fs::write(&path, source).unwrap();

    let module = load_module(&path).unwrap();
    let report = run_module(module, "other").unwrap();

    assert_eq!(report.entry, "other");
    assert_eq!(report.result, 7);
}

/// Test: A trapping program surfaces as the abort error the binary
/// maps to exit code 1
#[test]
fn test_e2e_trap_propagates() {
    let source = r#"
atom 1 main at=crash.fe:1:1

func 1 0
  stacksize 4
  loadimm %2, 9
  div %3, %2, %0
  ret %3
end
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crash.fasm");
    fs::write(&path, source).unwrap();

    let error = run_module(load_module(&path).unwrap(), "main").unwrap_err();
    match error {
        CliError::Aborted(trap) => {
            assert_eq!(trap.kind, TrapKind::DivisionByZero);
            assert!(!trap.stack.is_empty());
        }
        other => panic!("unexpected error: {}", other),
    }
}
