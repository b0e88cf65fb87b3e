//! Core Execution Scenario Tests
//!
//! Complete invocations through the public Context surface, verifying
//! results, abort diagnostics, and register stack balance across call
//! boundaries.

use std::sync::Arc;
use std::thread;

use core_types::{AtomId, InstanceId, LabelId, Lvid, SourceOrigin, TrapKind};
use interpreter::Context;
use ir_system::{AtomInfo, Module, Opcode, Sequence};

/// Adds one function to the module: an atom plus its instance 0 body.
fn function(module: &mut Module, id: u32, name: &str, frame: u32, body: &[Opcode]) {
    module.add_atom(AtomId(id), AtomInfo::new(name));
    let mut seq = Sequence::with_frame_size(frame);
    for op in body {
        seq.emit(op.clone());
    }
    module.add_sequence(AtomId(id), InstanceId(0), seq);
}

/// Test: Add two constants and return the sum
#[test]
fn test_add_two_numbers() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "main",
        5,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 2,
            },
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 3,
            },
            Opcode::Add {
                dst: Lvid(4),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Ret { src: Lvid(4) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");
    assert_eq!(result.as_u64(), 5);
}

/// Test: Allocate, store, load back, free - no leak afterwards
#[test]
fn test_heap_round_trip() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "main",
        6,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 16,
            },
            Opcode::MemAlloc {
                dst: Lvid(3),
                size: Lvid(2),
            },
            Opcode::LoadImm {
                dst: Lvid(4),
                value: 42,
            },
            Opcode::StoreU32 {
                ptr: Lvid(3),
                src: Lvid(4),
            },
            Opcode::LoadU32 {
                dst: Lvid(5),
                ptr: Lvid(3),
            },
            Opcode::MemFree {
                ptr: Lvid(3),
                size: Lvid(2),
            },
            Opcode::Ret { src: Lvid(5) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");
    assert_eq!(result.as_u64(), 42);
    assert_eq!(ctx.live_block_count(), 0);
}

/// Test: Storing through a pointer the checker never saw aborts
#[test]
fn test_untracked_pointer_aborts() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "main",
        4,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 0x1000,
            },
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 7,
            },
            Opcode::StoreU64 {
                ptr: Lvid(2),
                src: Lvid(3),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::UnknownPointer);
    assert!(trap.message.contains("unknown pointer"));
}

/// Test: Division by zero aborts with a trace naming the atom
#[test]
fn test_division_by_zero_diagnostic() {
    let mut module = Module::new();
    module.add_atom(
        AtomId(1),
        AtomInfo::new("main").with_origin(SourceOrigin::new("demo.fe", 3, 1)),
    );
    let mut seq = Sequence::with_frame_size(4);
    seq.emit(Opcode::LoadImm {
        dst: Lvid(2),
        value: 9,
    });
    seq.emit(Opcode::Div {
        dst: Lvid(3),
        a: Lvid(2),
        b: Lvid(0),
    });
    seq.emit(Opcode::Ret { src: Lvid(3) });
    module.add_sequence(AtomId(1), InstanceId(0), seq);

    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();

    assert_eq!(trap.kind, TrapKind::DivisionByZero);
    assert_eq!(trap.opcode_offset, Some(2));
    assert_eq!(trap.stack.len(), 1);

    let frame = &trap.stack[0];
    assert_eq!(frame.function_name.as_deref(), Some("main"));
    assert_eq!(frame.source_path.as_deref(), Some("demo.fe"));
    assert_eq!(frame.atom, AtomId(1));
}

/// A main that calls down(40), which recurses to zero.
fn recursive_module() -> Module {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "main",
        4,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 40,
            },
            Opcode::Push { src: Lvid(2) },
            Opcode::Call {
                dst: Lvid(3),
                atom: AtomId(2),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(3) },
        ],
    );
    function(
        &mut module,
        2,
        "down",
        6,
        &[
            Opcode::Jz {
                cond: Lvid(2),
                label: LabelId(0),
            },
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 1,
            },
            Opcode::Sub {
                dst: Lvid(4),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Push { src: Lvid(4) },
            Opcode::Call {
                dst: Lvid(5),
                atom: AtomId(2),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(5) },
            Opcode::Label { id: LabelId(0) },
            Opcode::Ret { src: Lvid(0) },
        ],
    );
    module
}

/// Test: Deep recursion returns every register it acquired
#[test]
fn test_call_return_register_balance() {
    let mut ctx = Context::new(Arc::new(recursive_module()));
    assert_eq!(ctx.interpreter().register_stack().used(), 0);

    let result = ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");

    assert_eq!(result.as_u64(), 0);
    assert_eq!(ctx.interpreter().register_stack().used(), 0);
}

/// Test: Repeated invocations reuse chunks instead of growing
#[test]
fn test_register_chunks_reach_steady_state() {
    let mut ctx = Context::new(Arc::new(recursive_module()));

    ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");
    let stack = ctx.interpreter().register_stack();
    let capacity = stack.capacity();
    let spare = stack.spare_capacity();

    ctx.invoke_atom(AtomId(1), &[]).expect("invocation failed");
    let stack = ctx.interpreter().register_stack();
    assert_eq!(stack.capacity(), capacity);
    assert_eq!(stack.spare_capacity(), spare);
    assert_eq!(stack.used(), 0);
}

/// Test: Contexts over one shared module stay independent
#[test]
fn test_contexts_are_independent() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "answer",
        5,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 2,
            },
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 3,
            },
            Opcode::Add {
                dst: Lvid(4),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Ret { src: Lvid(4) },
        ],
    );
    function(
        &mut module,
        2,
        "boom",
        4,
        &[
            Opcode::Div {
                dst: Lvid(3),
                a: Lvid(2),
                b: Lvid(0),
            },
            Opcode::Ret { src: Lvid(3) },
        ],
    );

    let shared = Arc::new(module);
    let mut crashing = Context::new(shared.clone());
    let mut healthy = Context::new(shared);

    assert!(crashing.invoke_atom(AtomId(2), &[]).is_err());

    let result = healthy
        .invoke_atom(AtomId(1), &[])
        .expect("invocation failed");
    assert_eq!(result.as_u64(), 5);
}

/// Test: A context can move to another thread and run there
#[test]
fn test_context_moves_across_threads() {
    fn require_send<T: Send>(_: &T) {}

    let mut module = Module::new();
    function(
        &mut module,
        1,
        "main",
        5,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 2,
            },
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 3,
            },
            Opcode::Add {
                dst: Lvid(4),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Ret { src: Lvid(4) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    require_send(&ctx);

    let handle = thread::spawn(move || {
        ctx.invoke_atom(AtomId(1), &[])
            .expect("invocation failed")
            .as_u64()
    });
    assert_eq!(handle.join().unwrap(), 5);
}
