//! Frame instructions: ALLOC, ARG, LGET, CALL, RET and CLEAR.

use super::{DebugEvent, Machine, HALT_LINK};
use crate::error::{Fault, FaultKind};
use bpl_core::Value;
use std::io::Write;

fn invalid_frame(message: impl Into<String>) -> Fault {
    Fault::new(FaultKind::InvalidReference, message)
}

fn unsigned(what: &str, n: i64) -> Fault {
    Fault::new(
        FaultKind::UnsignedOperandExpected,
        format!("{} must not be negative, got {}", what, n),
    )
}

impl<'p, W: Write> Machine<'p, W> {
    pub(super) fn alloc(&mut self, n: i64) -> Result<(), Fault> {
        let n = usize::try_from(n).map_err(|_| unsigned("local slot count", n))?;
        self.stack.alloc(n)
    }

    pub(super) fn arg(&mut self, n: i64) -> Result<(), Fault> {
        let value = self.stack.get_arg(self.fp, n)?.clone();
        self.stack.push(value)
    }

    pub(super) fn local_get(&mut self, n: i64) -> Result<(), Fault> {
        let value = self.stack.get_local(self.fp, n)?.clone();
        self.stack.push(value)
    }

    /// Push the argument count and the link, then enter `target` with a fresh
    /// frame above them.
    pub(super) fn call(&mut self, target: i64, argc: i64) -> Result<(), Fault> {
        let target = self.jump_target(target)?;
        let argc = usize::try_from(argc).map_err(|_| unsigned("argument count", argc))?;
        let available = self.stack.depth().saturating_sub(self.fp);
        if argc > available {
            return Err(Fault::new(
                FaultKind::StackUnderflow,
                format!("call needs {} argument(s), frame holds {}", argc, available),
            ));
        }
        let limit = self.config.max_call_depth;
        if limit > 0 && self.returns.len() >= limit {
            return Err(Fault::new(
                FaultKind::StackOverflow,
                format!("call depth exceeded {}", limit),
            ));
        }
        self.stack.reserve(2)?;
        self.stack.push(Value::Int(argc as i64))?;
        self.stack.push(Value::Int(self.fp as i64))?;
        self.returns.push(self.ip);
        self.fp = self.stack.depth();
        self.ip = target;
        tracing::debug!(to = target, argc, fp = self.fp, "call");
        self.emit_debug_event(DebugEvent::CallEnter { target, argc });
        Ok(())
    }

    /// RET (`with_result`) and CLEAR: drop the current frame, its link, count
    /// and arguments, then resume the caller or halt at the loader frame.
    pub(super) fn unwind(&mut self, with_result: bool) -> Result<(), Fault> {
        let fp = self.fp;
        let result = if with_result {
            if self.stack.depth() <= fp {
                return Err(Fault::new(
                    FaultKind::StackUnderflow,
                    "return from a frame with no value",
                ));
            }
            Some(self.stack.peek(0)?.clone())
        } else {
            None
        };

        // A raw machine has no link below its frame.
        let (base, resume) = if fp < 2 {
            (0, None)
        } else {
            self.frame_exit(fp)?
        };

        self.stack.truncate(base);
        match resume {
            Some((caller_fp, return_ip)) => {
                self.returns.pop();
                self.fp = caller_fp;
                self.ip = return_ip;
                tracing::debug!(ip = return_ip, fp = caller_fp, "return");
            }
            None => self.halt(),
        }
        self.emit_debug_event(DebugEvent::CallExit {
            result: result.clone(),
        });
        if let Some(value) = result {
            self.stack.push(value)?;
        }
        Ok(())
    }

    /// Base of the frame at `fp` (where its first argument sits) and the
    /// caller's `fp` and return address, or `None` for the loader frame.
    fn frame_exit(&self, fp: usize) -> Result<(usize, Option<(usize, usize)>), Fault> {
        let link = self
            .stack
            .get(fp - 1)
            .and_then(Value::as_int)
            .ok_or_else(|| invalid_frame("frame link word is not an integer"))?;
        let argc = self.stack.arg_count(fp)?;
        let base = usize::try_from(argc)
            .ok()
            .and_then(|n| (fp - 2).checked_sub(n))
            .ok_or_else(|| {
                invalid_frame(format!("argument count {} does not fit the frame", argc))
            })?;
        if link == HALT_LINK {
            return Ok((base, None));
        }
        let caller_fp = usize::try_from(link)
            .ok()
            .filter(|&l| l <= base)
            .ok_or_else(|| {
                invalid_frame(format!("frame link {} does not point below the frame", link))
            })?;
        let return_ip = *self
            .returns
            .last()
            .ok_or_else(|| invalid_frame("frame has no return address"))?;
        Ok((base, Some((caller_fp, return_ip))))
    }
}
