//! Stack VM dispatch loop for executing BPL bytecode.

mod calls;
mod ops;

use ops::{Condition, GOLDEN_RATIO};

use crate::config::VmConfig;
use crate::diagnostics::FaultReporter;
use crate::error::{Fault, FaultKind, Trap, VmError};
use crate::stack::OperandStack;
use bpl_core::disasm::disassemble_at;
use bpl_core::{InstructionTable, OpCode, Program, Value};
use std::f64::consts::{E, PI};
use std::io::{self, Stdout, Write};
use strum::Display;

/// Link word of the loader frame. Unwinding a frame with this link halts.
pub const HALT_LINK: i64 = -1;

/// Operand words are read into a fixed buffer; no opcode takes more.
const MAX_OPERANDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MachineState {
    Running,
    Halted,
    Faulted,
}

/// Type alias for debug callback to simplify type signatures
pub type DebugCallback = Option<Box<dyn FnMut(&DebugEvent)>>;

/// Debug events emitted during execution, for step-through debuggers.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// An instruction was decoded and is about to run.
    Step { ip: usize, opcode: OpCode },
    /// CALL entered a new frame.
    CallEnter { target: usize, argc: usize },
    /// RET or CLEAR left a frame.
    CallExit { result: Option<Value> },
    /// A fault was raised, before it is reported.
    Fault { kind: FaultKind, ip: usize },
}

/// One execution of a [`Program`].
///
/// The machine borrows its program, so several machines can run the same
/// program and constant pools. Output from the print opcodes and fault
/// reports goes to `W`.
pub struct Machine<'p, W: Write = Stdout> {
    program: &'p Program,
    table: &'p InstructionTable,
    config: VmConfig,
    stack: OperandStack,
    /// Return addresses of active CALL frames, innermost last.
    returns: Vec<usize>,
    ip: usize,
    fp: usize,
    /// Start address of the instruction being executed.
    op_start: usize,
    state: MachineState,
    executed: u64,
    reporter: FaultReporter,
    debug_callback: DebugCallback,
    out: W,
}

impl<'p> Machine<'p, Stdout> {
    /// A raw machine writing to stdout: empty stack, no initial frame.
    pub fn new(program: &'p Program) -> Self {
        Self::with_output(program, io::stdout())
    }

    /// A machine writing to stdout with `args` loaded as the initial frame.
    pub fn with_args(program: &'p Program, args: Vec<Value>) -> Result<Self, VmError> {
        let mut machine = Self::new(program);
        machine.load(args)?;
        Ok(machine)
    }
}

impl<'p, W: Write> Machine<'p, W> {
    pub fn with_output(program: &'p Program, out: W) -> Self {
        let config = VmConfig::default();
        Self {
            program,
            table: InstructionTable::standard(),
            stack: OperandStack::new(config.max_stack_depth),
            reporter: FaultReporter::new(&config),
            config,
            returns: Vec::new(),
            ip: 0,
            fp: 0,
            op_start: 0,
            state: MachineState::Running,
            executed: 0,
            debug_callback: None,
            out,
        }
    }

    /// Replace the limits and fault policy. Meant to be called before the
    /// first step.
    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.stack.set_max_depth(config.max_stack_depth);
        self.reporter = FaultReporter::new(&config);
        self.config = config;
        self
    }

    pub fn with_table(mut self, table: &'p InstructionTable) -> Self {
        self.table = table;
        self
    }

    pub fn set_debug_callback(&mut self, callback: impl FnMut(&DebugEvent) + 'static) {
        self.debug_callback = Some(Box::new(callback));
    }

    /// Loader protocol: push `args` in reverse, then the argument count, then
    /// the [`HALT_LINK`] word, and point `fp` just above them.
    pub fn load(&mut self, args: Vec<Value>) -> Result<(), VmError> {
        if self.executed > 0 || !self.stack.is_empty() {
            return Err(VmError::AlreadyStarted);
        }
        let argc = args.len();
        self.stack.reserve(argc + 2).map_err(VmError::Load)?;
        for arg in args.into_iter().rev() {
            self.stack.push(arg).map_err(VmError::Load)?;
        }
        self.stack
            .push(Value::Int(argc as i64))
            .map_err(VmError::Load)?;
        self.stack
            .push(Value::Int(HALT_LINK))
            .map_err(VmError::Load)?;
        self.fp = self.stack.depth();
        tracing::debug!(argc, fp = self.fp, "loaded initial frame");
        Ok(())
    }

    /// Load `args` and run to completion.
    pub fn start(&mut self, args: Vec<Value>) -> Result<(), VmError> {
        self.load(args)?;
        self.run()
    }

    /// Run until the machine halts or hits a fatal fault.
    pub fn run(&mut self) -> Result<(), VmError> {
        while self.step()? == MachineState::Running {}
        self.out.flush()?;
        Ok(())
    }

    /// Execute one instruction and return the resulting state.
    pub fn step(&mut self) -> Result<MachineState, VmError> {
        if self.state != MachineState::Running {
            return Err(VmError::NotRunning(self.state));
        }
        self.op_start = self.ip;
        let Some(&word) = self.program.code.get(self.ip) else {
            tracing::warn!(ip = self.ip, "ran past the end of the code, halting");
            self.state = MachineState::Halted;
            return Ok(self.state);
        };

        let limit = self.config.max_instructions;
        if limit > 0 && self.executed >= limit {
            return self.raise(Fault::new(
                FaultKind::InstructionLimitExceeded,
                format!("instruction budget of {} exhausted", limit),
            ));
        }
        self.executed += 1;

        let result = match self.decode(word) {
            Ok((op, operands)) => {
                self.trace(op);
                self.execute(op, operands)
            }
            Err(fault) => Err(Trap::Fault(fault)),
        };
        match result {
            Ok(()) => Ok(self.state),
            Err(Trap::Fault(fault)) => self.raise(fault),
            Err(Trap::Io(err)) => {
                self.state = MachineState::Faulted;
                Err(VmError::Io(err))
            }
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn fp(&self) -> usize {
        self.fp
    }

    /// Active CALL frames (the loader frame is not counted).
    pub fn call_depth(&self) -> usize {
        self.returns.len()
    }

    /// Instructions executed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn fault_count(&self) -> u64 {
        self.reporter.count()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Registers and stack, one per line.
    pub fn dump(&self) -> String {
        let tos = match self.stack.peek(0) {
            Ok(v) => v.to_string(),
            Err(_) => "-".to_string(),
        };
        format!(
            "State: {}\nIP: 0x{:04X}\nFP: {}\nDepth: {}\nTOS: {}\nStack: {}",
            self.state,
            self.ip,
            self.fp,
            self.stack.depth(),
            tos,
            self.stack
        )
    }

    /// Read the opcode's operands and move `ip` past the instruction.
    fn decode(&mut self, word: i64) -> Result<(OpCode, [i64; MAX_OPERANDS]), Fault> {
        let info = *self.table.decode(word).ok_or_else(|| {
            Fault::new(
                FaultKind::UnknownOpcode,
                format!("unknown opcode 0x{:02X}", word),
            )
        })?;
        let start = self.ip + 1;
        let end = start + info.arity;
        let words = self.program.code.get(start..end).ok_or_else(|| {
            Fault::new(
                FaultKind::TruncatedInstruction,
                format!(
                    "{} needs {} operand(s) but the code ends at 0x{:04X}",
                    info.name,
                    info.arity,
                    self.program.code.len()
                ),
            )
        })?;
        let mut operands = [0; MAX_OPERANDS];
        operands[..info.arity].copy_from_slice(words);
        self.ip = end;
        Ok((info.op, operands))
    }

    fn trace(&mut self, op: OpCode) {
        if self.config.trace {
            if let Some(line) = disassemble_at(&self.program.code, self.op_start, self.table) {
                tracing::trace!(
                    target: "bpl_vm::exec",
                    fp = self.fp,
                    depth = self.stack.depth(),
                    "{}",
                    line
                );
            }
        }
        self.emit_debug_event(DebugEvent::Step {
            ip: self.op_start,
            opcode: op,
        });
    }

    fn emit_debug_event(&mut self, event: DebugEvent) {
        if let Some(callback) = self.debug_callback.as_mut() {
            callback(&event);
        }
    }

    /// Report `fault` and apply the policy for its kind.
    fn raise(&mut self, fault: Fault) -> Result<MachineState, VmError> {
        self.emit_debug_event(DebugEvent::Fault {
            kind: fault.kind,
            ip: self.op_start,
        });
        let report = match self.reporter.report(
            fault,
            self.op_start,
            &self.program.code,
            self.table,
            &self.stack,
            &mut self.out,
        ) {
            Ok(report) => report,
            Err(err) => {
                self.state = MachineState::Faulted;
                return Err(err.into());
            }
        };
        if report.is_fatal() {
            self.state = MachineState::Faulted;
            return Err(VmError::Fatal(Box::new(report)));
        }
        Ok(self.state)
    }

    fn halt(&mut self) {
        tracing::debug!(ip = self.op_start, depth = self.stack.depth(), "halt");
        self.state = MachineState::Halted;
    }

    fn execute(&mut self, op: OpCode, operands: [i64; MAX_OPERANDS]) -> Result<(), Trap> {
        use OpCode::*;
        let [a, b, _] = operands;
        match op {
            Nop => {}
            Halt => self.halt(),
            NullRef => self.stack.push(Value::Null)?,

            LnFeed => self.out.write_all(b"\n")?,
            PrintVal | PrintlnVal => self.print_value(op == PrintlnVal)?,
            PrintRef | PrintlnRef => self.print_reference(op == PrintlnRef)?,
            PrintUni | PrintlnUni => self.print_unicode(op == PrintlnUni)?,

            Iconst0 => self.stack.push(Value::Int(0))?,
            Iconst1 => self.stack.push(Value::Int(1))?,
            Iconst2 => self.stack.push(Value::Int(2))?,
            Iconst3 => self.stack.push(Value::Int(3))?,
            Iconst4 => self.stack.push(Value::Int(4))?,
            Iconst5 => self.stack.push(Value::Int(5))?,
            Iconst => self.int_constant(a)?,
            Rconst0 => self.stack.push(Value::Real(0.0))?,
            Rconst1 => self.stack.push(Value::Real(1.0))?,
            Rconst2 => self.stack.push(Value::Real(2.0))?,
            Rconst3 => self.stack.push(Value::Real(3.0))?,
            Rconst4 => self.stack.push(Value::Real(4.0))?,
            Rconst5 => self.stack.push(Value::Real(5.0))?,
            Rconst => self.real_constant(a)?,
            RconstE => self.stack.push(Value::Real(E))?,
            RconstPi => self.stack.push(Value::Real(PI))?,
            RconstPhi => self.stack.push(Value::Real(GOLDEN_RATIO))?,
            Sconst => self.string_constant(a)?,

            Drop => {
                self.stack.pop()?;
            }
            Dup => self.stack.duplicate(1)?,
            Dup2 => self.stack.duplicate(2)?,
            Swap => self.stack.top_mut(2)?.swap(0, 1),
            Swap2 => self.stack.top_mut(4)?.rotate_left(2),

            Iadd => self.int_binary("add", |x, y| Ok(x.wrapping_add(y)))?,
            Isub => self.int_binary("subtract", |x, y| Ok(x.wrapping_sub(y)))?,
            Imul => self.int_binary("multiply", |x, y| Ok(x.wrapping_mul(y)))?,
            Imod => self.int_binary("take the remainder of", ops::remainder)?,
            Ishl => self.int_binary("shift", ops::shift_left)?,
            Ishr => self.int_binary("shift", ops::shift_right)?,
            Iand => self.int_binary("and", |x, y| Ok(x & y))?,
            Ior => self.int_binary("or", |x, y| Ok(x | y))?,
            Ixor => self.int_binary("xor", |x, y| Ok(x ^ y))?,
            Inot => self.int_unary("negate logically", |x| i64::from(x == 0))?,
            Icompl1 => self.int_unary("complement", |x| !x)?,
            Icompl2 => self.int_unary("complement", i64::wrapping_neg)?,
            Ieq => self.int_binary("compare", |x, y| Ok(i64::from(x == y)))?,
            Ineq => self.int_binary("compare", |x, y| Ok(i64::from(x != y)))?,

            Radd => self.real_binary("add", |x, y| Ok(x + y))?,
            Rsub => self.real_binary("subtract", |x, y| Ok(x - y))?,
            Rmul => self.real_binary("multiply", |x, y| Ok(x * y))?,
            Div => self.real_binary("divide", ops::divide)?,
            Rshl => self.scale_real(false)?,
            Rshr => self.scale_real(true)?,

            I2r => self.int_to_real()?,
            R2i => self.real_to_int()?,

            Inc => self.map_top(Value::increment)?,
            Dec => self.map_top(Value::decrement)?,
            Neg => self.map_top(Value::negate)?,

            Cmp => self.compare()?,
            Eq => self.equality(true)?,
            Neq => self.equality(false)?,
            Lt => self.real_predicate(|x, y| x < y)?,
            Leq => self.real_predicate(|x, y| x <= y)?,
            Gt => self.real_predicate(|x, y| x > y)?,
            Geq => self.real_predicate(|x, y| x >= y)?,

            Scat => self.concat()?,
            Slen => self.length()?,
            Sbyte => self.byte_at()?,
            Sslice => self.slice()?,

            Br => self.ip = self.jump_target(a)?,
            Br0 => self.branch(Condition::Zero, a)?,
            BrN0 => self.branch(Condition::NonZero, a)?,
            BrLt => self.branch(Condition::Lt, a)?,
            BrGt => self.branch(Condition::Gt, a)?,
            BrLeq => self.branch(Condition::Leq, a)?,
            BrGeq => self.branch(Condition::Geq, a)?,
            BrEq => self.branch(Condition::Eq, a)?,
            BrNeq => self.branch(Condition::Neq, a)?,
            BrNul => self.branch(Condition::Null, a)?,
            BrNnul => self.branch(Condition::NonNull, a)?,
            If0 => self.if_else(Condition::Zero, a, b)?,
            IfN0 => self.if_else(Condition::NonZero, a, b)?,
            IfLt => self.if_else(Condition::Lt, a, b)?,
            IfGt => self.if_else(Condition::Gt, a, b)?,
            IfLeq => self.if_else(Condition::Leq, a, b)?,
            IfGeq => self.if_else(Condition::Geq, a, b)?,
            IfEq => self.if_else(Condition::Eq, a, b)?,
            IfNeq => self.if_else(Condition::Neq, a, b)?,
            IfNul => self.if_else(Condition::Null, a, b)?,
            IfNnul => self.if_else(Condition::NonNull, a, b)?,

            Alloc => self.alloc(a)?,
            Arg => self.arg(a)?,
            Lget => self.local_get(a)?,
            Lset => self.stack.set_local(self.fp, a)?,
            Call => self.call(a, b)?,
            Clear => self.unwind(false)?,
            Ret => self.unwind(true)?,
        }
        Ok(())
    }
}
