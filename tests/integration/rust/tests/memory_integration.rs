//! Memory Manager and Interpreter Integration Tests
//!
//! Exercises the heap protocol across component boundaries: allocator
//! routing, the destroy protocol, leak reporting at teardown, and the
//! lifecycle hooks a host installs through the context configuration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use builtins::CaptureConsole;
use core_types::{AtomId, TrapKind};
use interpreter::intrinsics::install_console_intrinsics;
use interpreter::{Context, ContextConfig, IntrinsicCatalog, MemoryFilesystem, VirtualFilesystem};
use ir_system::Module;
use memory_manager::{LimitedAllocator, SystemAllocator, HEADER_SIZE};
use vm_cli::assemble;

/// Assembles a source against the built-in console catalog.
fn module(source: &str) -> Module {
    let mut catalog = IntrinsicCatalog::new();
    install_console_intrinsics(&mut catalog);
    assemble(source, &catalog).expect("assembly failed")
}

/// Test: A destructor reached through unref runs exactly once
#[test]
fn test_destructor_runs_through_assembled_code() {
    // main allocates a witness counter and a cell pointing at it. The
    // destructor increments whatever its cell points at, so the witness
    // value after unref counts destructor invocations.
    let source = r#"
atom 1 main
atom 2 cell size=16
atom 3 ~cell parent=2

func 1 0
  stacksize 8
  loadimm %2, 8
  memalloc %3, %2
  storeu64 %3, %0
  loadimm %4, 16
  memalloc %5, %4
  fieldset %5, 0, %3
  ref %5
  unref %5, 3, 0
  loadu64 %6, %3
  memfree %3, %2
  ret %6
end

func 3 0
  stacksize 6
  fieldget %3, %2, 0
  loadu64 %4, %3
  loadimm %5, 1
  add %4, %4, %5
  storeu64 %3, %4
  ret %0
end
"#;

    let mut ctx = Context::new(Arc::new(module(source)));
    let result = ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");

    assert_eq!(result.as_u64(), 1, "destructor must run exactly once");
    assert_eq!(ctx.live_block_count(), 0);
}

/// Test: An exhausted allocator traps the program and is notified
#[test]
fn test_limited_allocator_reports_exhaustion() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 4
  loadimm %2, 256
  memalloc %3, %2
  ret %0
end
"#;

    let allocator = Arc::new(LimitedAllocator::new(64));
    let config = ContextConfig::new().with_allocator(allocator.clone());
    let mut ctx = Context::with_config(Arc::new(module(source)), config).unwrap();

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::AllocationFailed);
    assert!(allocator.was_notified());
    assert_eq!(allocator.used_bytes(), 0);
}

/// Test: VM heap traffic is visible in the backing allocator
#[test]
fn test_allocator_observes_vm_heap_traffic() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 4
  loadimm %2, 16
  memalloc %3, %2
  ret %0
end
"#;

    let allocator = Arc::new(SystemAllocator::new());
    let config = ContextConfig::new()
        .with_allocator(allocator.clone())
        .with_console(Arc::new(CaptureConsole::new()));
    let mut ctx = Context::with_config(Arc::new(module(source)), config).unwrap();

    ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");

    // Every block carries the refcount header in front of its payload.
    assert_eq!(allocator.allocated_bytes(), 16 + HEADER_SIZE);
    assert_eq!(allocator.allocation_count(), 1);

    // Teardown purges the surviving block through the same allocator.
    drop(ctx);
    assert_eq!(allocator.allocated_bytes(), 0);
    assert_eq!(allocator.allocation_count(), 0);
}

/// Test: An abort purges every surviving block before returning
#[test]
fn test_abort_purges_through_the_allocator() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 6
  loadimm %2, 16
  memalloc %3, %2
  memalloc %4, %2
  div %5, %2, %0
  ret %0
end
"#;

    let allocator = Arc::new(SystemAllocator::new());
    let config = ContextConfig::new()
        .with_allocator(allocator.clone())
        .with_console(Arc::new(CaptureConsole::new()));
    let mut ctx = Context::with_config(Arc::new(module(source)), config).unwrap();

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::DivisionByZero);

    assert_eq!(ctx.live_block_count(), 0);
    assert_eq!(allocator.allocated_bytes(), 0);
}

/// Test: The teardown leak report names count and owning function
#[test]
fn test_leak_report_names_the_function() {
    let source = r#"
atom 1 main

func 1 0
  stacksize 4
  loadimm %2, 32
  memalloc %3, %2
  ret %0
end
"#;

    let console = Arc::new(CaptureConsole::new());
    let config = ContextConfig::new().with_console(console.clone());
    let mut ctx = Context::with_config(Arc::new(module(source)), config).unwrap();

    ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");
    assert_eq!(ctx.live_block_count(), 1);
    assert_eq!(ctx.live_block_bytes(), 32);

    drop(ctx);
    let stderr = console.stderr_output();
    assert!(stderr.contains("leak: 1 block(s)"));
    assert!(stderr.contains("'main'"));
}

/// Test: The teardown hook fires once, when the context is dropped
#[test]
fn test_teardown_hook_fires_on_drop() {
    let fired = Arc::new(AtomicUsize::new(0));
    let observer = Arc::clone(&fired);
    let config = ContextConfig::new().with_teardown_hook(Box::new(move || {
        observer.fetch_add(1, Ordering::Relaxed);
    }));

    let ctx = Context::with_config(Arc::new(Module::new()), config).unwrap();
    assert_eq!(fired.load(Ordering::Relaxed), 0);

    drop(ctx);
    assert_eq!(fired.load(Ordering::Relaxed), 1);
}

/// Test: The create hook can veto context creation
#[test]
fn test_create_hook_vetoes_creation() {
    let vetoed = Context::with_config(
        Arc::new(Module::new()),
        ContextConfig::new().with_create_hook(Box::new(|| false)),
    );
    assert!(vetoed.is_none());

    let allowed = Context::with_config(
        Arc::new(Module::new()),
        ContextConfig::new().with_create_hook(Box::new(|| true)),
    );
    assert!(allowed.is_some());
}

/// Test: Mounts route by longest prefix to the right backend
#[test]
fn test_mounts_route_by_longest_prefix() {
    let ctx = Context::new(Arc::new(Module::new()));
    let data = Arc::new(MemoryFilesystem::new());
    let logs = Arc::new(MemoryFilesystem::new());
    ctx.mount("/data", data.clone());
    ctx.mount("/data/logs", logs.clone());

    ctx.vfs().write("/data/logs/run.txt", b"x").unwrap();
    ctx.vfs().write("/data/cfg.txt", b"y").unwrap();

    assert!(logs.exists("run.txt"));
    assert!(!data.exists("logs/run.txt"));
    assert!(data.exists("cfg.txt"));
    assert!(ctx.vfs().exists("/data/logs/run.txt"));
}
