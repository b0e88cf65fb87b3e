//! Tests for the call/return protocol
//!
//! Tests cover:
//! - Calls with pushed arguments and return values
//! - Nested calls and recursion (factorial, countdown)
//! - Register-stack balance across deep recursion
//! - The reserved zero register as "discard" destination
//! - Argument, push and call-depth limits

use std::sync::Arc;

use core_types::{AtomId, InstanceId, LabelId, Lvid, Register, TrapKind};
use interpreter::{Context, ContextConfig};
use ir_system::{AtomInfo, Module, Opcode, Sequence};

/// Declares one function atom and attaches its instance-0 sequence.
fn function(module: &mut Module, id: u32, name: &str, frame: u32, body: &[Opcode]) {
    module.add_atom(AtomId(id), AtomInfo::new(name));
    let mut seq = Sequence::with_frame_size(frame);
    for op in body {
        seq.emit(*op);
    }
    module.add_sequence(AtomId(id), InstanceId(0), seq);
}

/// fn add(a, b) { return a + b }
fn add_function(module: &mut Module, id: u32) {
    function(
        module,
        id,
        "add",
        5,
        &[
            Opcode::Add {
                dst: Lvid(1),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Ret { src: Lvid(1) },
        ],
    );
}

/// fn fact(n) { if n <= 1 { return 1 } return n * fact(n - 1) }
fn factorial_function(module: &mut Module, id: u32) {
    function(
        module,
        id,
        "fact",
        8,
        &[
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 1,
            },
            Opcode::Ilte {
                dst: Lvid(4),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Jnz {
                cond: Lvid(4),
                label: LabelId(0),
            },
            Opcode::Sub {
                dst: Lvid(5),
                a: Lvid(2),
                b: Lvid(3),
            },
            Opcode::Push { src: Lvid(5) },
            Opcode::Call {
                dst: Lvid(6),
                atom: AtomId(id),
                instance: InstanceId(0),
            },
            Opcode::Imul {
                dst: Lvid(7),
                a: Lvid(2),
                b: Lvid(6),
            },
            Opcode::Ret { src: Lvid(7) },
            Opcode::Label {
                id: LabelId(0),
            },
            Opcode::Ret { src: Lvid(3) },
        ],
    );
}

#[test]
fn test_call_with_pushed_arguments() {
    let mut module = Module::new();
    add_function(&mut module, 2);
    // fn main() { return add(30, 12) }
    function(
        &mut module,
        1,
        "main",
        6,
        &[
            Opcode::LoadImm {
                dst: Lvid(2),
                value: 30,
            },
            Opcode::LoadImm {
                dst: Lvid(3),
                value: 12,
            },
            Opcode::Push { src: Lvid(2) },
            Opcode::Push { src: Lvid(3) },
            Opcode::Call {
                dst: Lvid(4),
                atom: AtomId(2),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(4) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_u64(), 42);
}

#[test]
fn test_call_into_zero_register_discards_result() {
    let mut module = Module::new();
    // fn seven() { return 7 }
    function(
        &mut module,
        2,
        "seven",
        3,
        &[
            Opcode::LoadImm {
                dst: Lvid(1),
                value: 7,
            },
            Opcode::Ret { src: Lvid(1) },
        ],
    );
    // fn main() { seven(); return %0 }
    function(
        &mut module,
        1,
        "main",
        4,
        &[
            Opcode::Call {
                dst: Lvid(0),
                atom: AtomId(2),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_u64(), 0);
}

#[test]
fn test_nested_calls_complete_depth_first() {
    let mut module = Module::new();
    // fn inner() { return 7 }
    function(
        &mut module,
        3,
        "inner",
        3,
        &[
            Opcode::LoadImm {
                dst: Lvid(1),
                value: 7,
            },
            Opcode::Ret { src: Lvid(1) },
        ],
    );
    // fn middle() { return inner() + 1 }
    function(
        &mut module,
        2,
        "middle",
        6,
        &[
            Opcode::Call {
                dst: Lvid(3),
                atom: AtomId(3),
                instance: InstanceId(0),
            },
            Opcode::LoadImm {
                dst: Lvid(4),
                value: 1,
            },
            Opcode::Add {
                dst: Lvid(5),
                a: Lvid(3),
                b: Lvid(4),
            },
            Opcode::Ret { src: Lvid(5) },
        ],
    );
    // fn outer() { return middle() + 1 }
    function(
        &mut module,
        1,
        "outer",
        6,
        &[
            Opcode::Call {
                dst: Lvid(3),
                atom: AtomId(2),
                instance: InstanceId(0),
            },
            Opcode::LoadImm {
                dst: Lvid(4),
                value: 1,
            },
            Opcode::Add {
                dst: Lvid(5),
                a: Lvid(3),
                b: Lvid(4),
            },
            Opcode::Ret { src: Lvid(5) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_u64(), 9);
}

#[test]
fn test_factorial_base_case() {
    let mut module = Module::new();
    factorial_function(&mut module, 1);

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx
        .invoke_atom(AtomId(1), &[Register::from_i64(1)])
        .unwrap();
    assert_eq!(result.as_i64(), 1);
}

#[test]
fn test_factorial_recursive() {
    let mut module = Module::new();
    factorial_function(&mut module, 1);

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx
        .invoke_atom(AtomId(1), &[Register::from_i64(5)])
        .unwrap();
    assert_eq!(result.as_i64(), 120);
}

#[test]
fn test_register_stack_balanced_after_deep_recursion() {
    let mut module = Module::new();
    // fn countdown(n) { if n != 0 { countdown(n - 1) } }
    function(
        &mut module,
        1,
        "countdown",
        6,
        &[
            Opcode::Jnz {
                cond: Lvid(2),
                label: LabelId(0),
            },
            Opcode::Ret { src: Lvid(0) },
            Opcode::Label {
                id: LabelId(0),
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
                dst: Lvid(0),
                atom: AtomId(1),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));

    // Warm the stack up, then snapshot its shape.
    ctx.invoke_atom(AtomId(1), &[Register::from_u64(8)]).unwrap();
    let stack = ctx.interpreter().register_stack();
    let before = (stack.used(), stack.capacity(), stack.spare_capacity());

    ctx.invoke_atom(AtomId(1), &[Register::from_u64(200)])
        .unwrap();
    let stack = ctx.interpreter().register_stack();
    let after = (stack.used(), stack.capacity(), stack.spare_capacity());

    assert_eq!(before, after);
    assert_eq!(after.0, 0);
}

#[test]
fn test_call_depth_limit_aborts() {
    let mut module = Module::new();
    // fn forever() { forever() }
    function(
        &mut module,
        1,
        "forever",
        3,
        &[
            Opcode::Call {
                dst: Lvid(0),
                atom: AtomId(1),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let config = ContextConfig::new().with_max_call_depth(64);
    let mut ctx = Context::with_config(Arc::new(module), config).unwrap();

    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::StackOverflow);
    assert!(trap.message.contains("64"));
}

#[test]
fn test_ret_of_zero_register_means_no_value() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "quiet",
        3,
        &[
            Opcode::LoadImm {
                dst: Lvid(1),
                value: 99,
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_u64(), 0);
}

#[test]
fn test_falling_off_the_end_returns_zero() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "open_ended",
        3,
        &[Opcode::LoadImm {
            dst: Lvid(1),
            value: 5,
        }],
    );

    let mut ctx = Context::new(Arc::new(module));
    let result = ctx.invoke_atom(AtomId(1), &[]).unwrap();
    assert_eq!(result.as_u64(), 0);
}

#[test]
fn test_stacksize_after_first_instruction_aborts() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "twice_sized",
        3,
        &[Opcode::Nop, Opcode::Stacksize { count: 3 }],
    );

    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::UnexpectedOpcode);
    assert_eq!(trap.opcode_offset, Some(2));
}

#[test]
fn test_pushing_past_the_argument_limit_aborts() {
    let mut module = Module::new();
    let mut body = vec![Opcode::LoadImm {
        dst: Lvid(1),
        value: 1,
    }];
    // One over the limit; the last push must trap.
    for _ in 0..33 {
        body.push(Opcode::Push { src: Lvid(1) });
    }
    body.push(Opcode::Ret { src: Lvid(0) });
    function(&mut module, 1, "pusher", 3, &body);

    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::TooManyParameters);
}

#[test]
fn test_argument_beyond_callee_frame_aborts() {
    let mut module = Module::new();
    // Frame of 3 has registers %0..%2; the second argument would land
    // in %3.
    function(&mut module, 2, "narrow", 3, &[Opcode::Ret { src: Lvid(0) }]);
    function(
        &mut module,
        1,
        "main",
        4,
        &[
            Opcode::LoadImm {
                dst: Lvid(1),
                value: 1,
            },
            Opcode::Push { src: Lvid(1) },
            Opcode::Push { src: Lvid(1) },
            Opcode::Call {
                dst: Lvid(0),
                atom: AtomId(2),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::InvalidRegister);
}

#[test]
fn test_calling_a_missing_sequence_aborts() {
    let mut module = Module::new();
    function(
        &mut module,
        1,
        "main",
        3,
        &[
            Opcode::Call {
                dst: Lvid(0),
                atom: AtomId(9),
                instance: InstanceId(0),
            },
            Opcode::Ret { src: Lvid(0) },
        ],
    );

    let mut ctx = Context::new(Arc::new(module));
    let trap = ctx.invoke_atom(AtomId(1), &[]).unwrap_err();
    assert_eq!(trap.kind, TrapKind::UnknownAtom);
}

#[test]
fn test_trace_is_empty_after_successful_return() {
    let mut module = Module::new();
    add_function(&mut module, 1);

    let mut ctx = Context::new(Arc::new(module));
    ctx.invoke_atom(AtomId(1), &[Register::from_u64(1), Register::from_u64(2)])
        .unwrap();

    assert!(ctx.interpreter().stacktrace().is_empty());
    assert_eq!(ctx.interpreter().register_stack().used(), 0);
}
