//! End-to-end tests: assemble bytecode and execute it in the VM.

use bpl_core::{OpCode, Program, ProgramBuilder, Value};
use bpl_vm::{Machine, MachineState};

use OpCode::*;

/// Helper: run a raw machine to completion, return the final stack and output.
fn execute(program: &Program) -> (Vec<Value>, String) {
    let mut machine = Machine::with_output(program, Vec::new());
    machine.run().expect("program should halt");
    assert_eq!(machine.state(), MachineState::Halted);
    let stack = machine.stack().as_slice().to_vec();
    let output = String::from_utf8(machine.into_output()).expect("utf-8 output");
    (stack, output)
}

/// Helper: load native arguments as the initial frame and run.
fn execute_with_args(program: &Program, args: Vec<Value>) -> Vec<Value> {
    let mut machine = Machine::with_output(program, Vec::new());
    machine.start(args).expect("program should halt");
    assert_eq!(machine.state(), MachineState::Halted);
    machine.stack().as_slice().to_vec()
}

fn build(f: impl FnOnce(&mut ProgramBuilder)) -> Program {
    let mut b = ProgramBuilder::new();
    f(&mut b);
    b.build().expect("program should assemble")
}

// ─── Arithmetic ───

#[test]
fn e2e_integer_addition() {
    let (stack, _) = execute(&Program::from_ops(&[Iconst0, Iconst1, Iadd, Halt]));
    assert_eq!(stack, vec![Value::Int(1)]);
}

#[test]
fn e2e_dup_then_add() {
    let (stack, _) = execute(&Program::from_ops(&[Iconst1, Dup, Iadd, Halt]));
    assert_eq!(stack, vec![Value::Int(2)]);
}

#[test]
fn e2e_three_way_compare() {
    let (stack, _) = execute(&Program::from_ops(&[Rconst2, Rconst3, Cmp, Halt]));
    assert_eq!(stack, vec![Value::Int(-1)]);

    let (stack, _) = execute(&Program::from_ops(&[Rconst3, Rconst3, Cmp, Halt]));
    assert_eq!(stack, vec![Value::Int(0)]);
}

#[test]
fn e2e_integer_ops() {
    let program = build(|b| {
        b.push_int(17).push_int(5).op(Imod);
        b.push_int(1).push_int(10).op(Ishl);
        b.push_int(-16).push_int(2).op(Ishr);
        b.push_int(0b1100).push_int(0b1010).op(Ixor);
        b.push_int(7).op(Icompl1);
        b.push_int(7).op(Icompl2);
        b.push_int(0).op(Inot);
        b.push_int(i64::MAX).push_int(1).op(Iadd);
        b.op(Halt);
    });
    let (stack, _) = execute(&program);
    assert_eq!(
        stack,
        vec![
            Value::Int(2),
            Value::Int(1024),
            Value::Int(-4),
            Value::Int(0b0110),
            Value::Int(-8),
            Value::Int(-7),
            Value::Int(1),
            Value::Int(i64::MIN),
        ]
    );
}

#[test]
fn e2e_real_arithmetic_and_scaling() {
    let program = build(|b| {
        b.ops(&[Rconst5, Rconst2, Div]);
        b.push_real(1.5).push_int(2).op(Rshl);
        b.push_real(1.5).push_int(1).op(Rshr);
        b.ops(&[Rconst1, Rconst2, Rsub]);
        b.op(Halt);
    });
    let (stack, _) = execute(&program);
    assert_eq!(
        stack,
        vec![
            Value::Real(2.5),
            Value::Real(150.0),
            Value::Real(0.15),
            Value::Real(-1.0),
        ]
    );
}

#[test]
fn e2e_explicit_conversions() {
    let program = build(|b| {
        b.push_int(3).op(I2r).op(Rconst2).op(Rmul);
        b.push_real(-2.9).op(R2i);
        b.op(Halt);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::Real(6.0), Value::Int(-2)]);
}

#[test]
fn e2e_kind_preserving_inc_dec_neg() {
    let (stack, _) = execute(&Program::from_ops(&[
        Iconst3, Inc, Rconst1, Dec, Iconst2, Neg, Halt,
    ]));
    assert_eq!(
        stack,
        vec![Value::Int(4), Value::Real(0.0), Value::Int(-2)]
    );
}

#[test]
fn e2e_math_constants() {
    let (stack, _) = execute(&Program::from_ops(&[RconstE, RconstPi, RconstPhi, Halt]));
    assert_eq!(stack[0], Value::Real(std::f64::consts::E));
    assert_eq!(stack[1], Value::Real(std::f64::consts::PI));
    let phi = stack[2].as_real().unwrap();
    assert!((phi * phi - phi - 1.0).abs() < 1e-12);
}

#[test]
fn e2e_equality_is_kind_strict() {
    let (stack, _) = execute(&Program::from_ops(&[
        Iconst1, Rconst1, Eq, Iconst1, Iconst1, Eq, NullRef, NullRef, Neq, Halt,
    ]));
    assert_eq!(stack, vec![Value::Int(0), Value::Int(1), Value::Int(0)]);
}

// ─── Stack shuffles ───

#[test]
fn e2e_stack_shuffles() {
    let (stack, _) = execute(&Program::from_ops(&[
        Iconst1, Iconst2, Dup2, Swap, Iconst3, Iconst4, Swap2, Drop, Halt,
    ]));
    // [1 2] -> dup2 [1 2 1 2] -> swap [1 2 2 1] -> [1 2 2 1 3 4]
    // -> swap2 [1 2 3 4 2 1] -> drop [1 2 3 4 2]
    let ints: Vec<_> = stack.iter().filter_map(Value::as_int).collect();
    assert_eq!(ints, vec![1, 2, 3, 4, 2]);
}

// ─── Strings ───

#[test]
fn e2e_string_ops() {
    let program = build(|b| {
        b.push_str("hello").push_int(1).push_int(3).op(Sslice);
        b.push_str("lo").op(Scat);
        b.op(Dup).op(Slen);
        b.push_str("hello").push_int(1).op(Sbyte);
        b.op(Halt);
    });
    let (stack, _) = execute(&program);
    assert_eq!(
        stack,
        vec![Value::from("ello"), Value::Int(4), Value::Byte(b'e')]
    );
}

// ─── I/O ───

#[test]
fn e2e_print_forms() {
    let program = build(|b| {
        b.push_str("hi").op(PrintlnVal);
        b.push_int(65).op(PrintUni);
        b.push_int(0x263A).op(PrintlnUni);
        b.push_int(255).op(PrintlnRef);
        b.op(Rconst2).op(PrintVal).op(LnFeed);
        b.op(Halt);
    });
    let (stack, output) = execute(&program);
    assert!(stack.is_empty());
    assert_eq!(output, "\"hi\"\nA\u{263A}\n*(0xFF)\n2.0\n");
}

// ─── Control flow ───

#[test]
fn e2e_counting_loop() {
    // acc = 0; for i in (1..=5).rev() { acc += i }
    let program = build(|b| {
        b.emit(Alloc, &[1]);
        b.op(Iconst0).emit(Lset, &[0]);
        b.op(Iconst5);
        let top = b.here();
        b.op(Dup).emit(Lget, &[0]).op(Iadd).emit(Lset, &[0]);
        b.op(Dec).op(Dup).emit(BrN0, &[top]);
        b.op(Drop).op(Halt);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::Int(15)]);
}

#[test]
fn e2e_default_machine_has_no_budget() {
    // 3 instructions per iteration, well past ten million in total
    let program = build(|b| {
        b.push_int(4_000_000);
        let top = b.here();
        b.op(Dec).op(Dup).emit(BrN0, &[top]);
        b.op(Halt);
    });
    let mut machine = Machine::with_output(&program, Vec::new());
    machine.run().expect("default config should not bound execution");
    assert_eq!(machine.state(), MachineState::Halted);
    assert!(machine.executed() > 10_000_000);
    assert_eq!(machine.stack().as_slice(), &[Value::Int(0)]);
}

#[test]
fn e2e_default_stack_grows() {
    let program = build(|b| {
        b.emit(Alloc, &[70_000]).op(Halt);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack.len(), 70_000);
    assert!(stack.iter().all(|v| *v == Value::Null));
}

#[test]
fn e2e_if_else_picks_a_branch() {
    let program = build(|b| {
        b.ops(&[Rconst2, Rconst3]);
        let at = b.here();
        b.emit(IfLt, &[0, 0]);
        let then = b.here();
        b.push_str("less").op(Halt);
        let otherwise = b.here();
        b.push_str("not less").op(Halt);
        b.patch(at + 1, then).patch(at + 2, otherwise);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::from("less")]);
}

#[test]
fn e2e_null_branches() {
    let program = build(|b| {
        b.op(NullRef);
        let at = b.here();
        b.emit(BrNul, &[0]);
        b.push_str("fell through").op(Halt);
        let target = b.here();
        b.push_str("was null").op(Halt);
        b.patch(at + 1, target);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::from("was null")]);
}

// ─── Calls and frames ───

#[test]
fn e2e_call_and_return() {
    let program = build(|b| {
        b.ops(&[Iconst3, Iconst4]);
        let call = b.here();
        b.emit(Call, &[0, 2]).op(Halt);
        let func = b.here();
        // ARG 1 is the last argument pushed
        b.emit(Arg, &[1]).emit(Arg, &[2]).op(Isub).op(Ret);
        b.patch(call + 1, func);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::Int(1)]);
}

#[test]
fn e2e_recursive_factorial() {
    let program = build(|b| {
        b.op(Iconst5);
        let main_call = b.here();
        b.emit(Call, &[0, 1]).op(Halt);

        let fact = b.here();
        b.emit(Arg, &[1]);
        let to_base = b.here();
        b.emit(Br0, &[0]);
        b.emit(Arg, &[1]).emit(Arg, &[1]).op(Dec);
        b.emit(Call, &[fact, 1]).op(Imul).op(Ret);
        let base = b.here();
        b.op(Iconst1).op(Ret);

        b.patch(main_call + 1, fact).patch(to_base + 1, base);
    });
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::Int(120)]);
}

#[test]
fn e2e_loader_frame_arguments() {
    // native args arrive in order: ARG 1 is the first argument
    let program = build(|b| {
        b.emit(Arg, &[1]).emit(Arg, &[2]).op(Isub).op(Ret);
    });
    let stack = execute_with_args(&program, vec![Value::Int(10), Value::Int(20)]);
    assert_eq!(stack, vec![Value::Int(-10)]);
}

#[test]
fn e2e_argument_count_is_arg_zero() {
    let program = build(|b| {
        b.emit(Arg, &[0]).op(Ret);
    });
    let stack = execute_with_args(
        &program,
        vec![Value::from("a"), Value::Null, Value::Real(1.0)],
    );
    assert_eq!(stack, vec![Value::Int(3)]);
}

#[test]
fn e2e_locals() {
    let program = build(|b| {
        b.emit(Alloc, &[2]);
        b.op(Iconst5).emit(Lset, &[0]);
        b.emit(Lget, &[0]).emit(Lget, &[0]).op(Iadd).emit(Lset, &[1]);
        b.emit(Lget, &[1]).op(Ret);
    });
    let stack = execute_with_args(&program, vec![]);
    assert_eq!(stack, vec![Value::Int(10)]);
}

#[test]
fn e2e_clear_returns_nothing() {
    let program = build(|b| {
        b.op(Iconst2).emit(Alloc, &[3]).op(Iconst4).op(Clear);
    });
    let stack = execute_with_args(&program, vec![Value::Int(9)]);
    assert!(stack.is_empty());
}

#[test]
fn e2e_machines_share_a_program() {
    let program = Program::from_ops(&[Iconst2, Iconst3, Imul, Halt]);
    let mut first = Machine::with_output(&program, Vec::new());
    let mut second = Machine::with_output(&program, Vec::new());
    first.run().unwrap();
    second.step().unwrap();
    assert_eq!(first.stack().as_slice(), &[Value::Int(6)]);
    assert_eq!(second.stack().as_slice(), &[Value::Int(2)]);
    assert_eq!(second.state(), MachineState::Running);
}

#[test]
fn e2e_program_from_json() {
    let json = format!(
        r#"{{"code":[{},0,{},{}],"ints":[40]}}"#,
        Iconst.word(),
        Iconst2.word(),
        Iadd.word()
    );
    let program = Program::from_json(&json).unwrap();
    let (stack, _) = execute(&program);
    assert_eq!(stack, vec![Value::Int(42)]);
}
