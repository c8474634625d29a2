use bpl_core::{OpCode, Program, ProgramBuilder};
use bpl_vm::{Machine, VmConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::io;

use OpCode::*;

/// Count `n` down to zero on the stack.
fn countdown(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.push_int(n);
    let top = b.here();
    b.op(Dec).op(Dup).emit(BrN0, &[top]).op(Halt);
    b.build().unwrap()
}

/// Recursive factorial of `n`, exercising CALL/RET.
fn factorial(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.push_int(n);
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
    b.build().unwrap()
}

fn dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let config = VmConfig {
        max_instructions: 0,
        ..VmConfig::default()
    };

    for n in [1_000_i64, 10_000, 100_000] {
        let program = countdown(n);
        group.bench_with_input(BenchmarkId::new("countdown", n), &program, |b, program| {
            b.iter(|| {
                let mut machine =
                    Machine::with_output(program, io::sink()).with_config(config.clone());
                machine.run().unwrap();
                black_box(machine.stack().depth())
            });
        });
    }

    for n in [5_i64, 20] {
        let program = factorial(n);
        group.bench_with_input(BenchmarkId::new("factorial", n), &program, |b, program| {
            b.iter(|| {
                let mut machine = Machine::with_output(program, io::sink());
                machine.run().unwrap();
                black_box(machine.stack().depth())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, dispatch_benchmark);
criterion_main!(benches);
