pub mod options;

pub use options::{EngineMode, SessionOptions};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use z3::ast::Bool;
use z3::Context;

use crate::engine::host::DebuggerHost;
use crate::engine::{ProcessedInstruction, SymbolicEngine};
use crate::solver::input::Input;
use crate::solver::negate;
use crate::solver::path_log::{PathConstraint, PathLog};
use crate::solver::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Tracing,
    Suspended,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TraceCounters {
    pub traced_instructions: u64,
    pub symbolic_instructions: u64,
    pub symbolic_branches: u64,
    pub window_instructions: u64, // reset when tracing resumes
}

// What one trace_step call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    NotTracing,
    Traced { recorded: Option<usize> }, // bound of the appended record, if any
    Unsupported { address: u64 },       // skipped; tracing continues
    InstructionLimit { window: u64 },   // window budget used up, suspended
    TimeLimit { elapsed: Duration },    // wall-clock budget used up, suspended
}

/// One tracing session against one debugged process: the path-constraint
/// log, its counters and the tracing state machine. All operations run on
/// the debug-event thread; nothing here locks or blocks asynchronously.
pub struct TraceSession<'ctx> {
    ctx: &'ctx Context,
    status: SessionStatus,
    log: PathLog<'ctx>,
    counters: TraceCounters,
    started: Option<Instant>,
    pub options: SessionOptions,
}

impl<'ctx> TraceSession<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self::with_options(ctx, SessionOptions::default())
    }

    pub fn with_options(ctx: &'ctx Context, options: SessionOptions) -> Self {
        TraceSession {
            ctx,
            status: SessionStatus::Idle,
            log: PathLog::new(),
            counters: TraceCounters::default(),
            started: None,
            options,
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn counters(&self) -> TraceCounters {
        self.counters
    }

    pub fn log(&self) -> &PathLog<'ctx> {
        &self.log
    }

    pub fn start_tracing(&mut self) {
        match self.status {
            SessionStatus::Idle => {
                // the time limit counts from here
                self.started = Some(Instant::now());
                self.counters.window_instructions = 0;
                self.status = SessionStatus::Tracing;
                info!("tracing started");
            }
            SessionStatus::Suspended => self.resume(),
            SessionStatus::Tracing => debug!("start_tracing: already tracing"),
        }
    }

    pub fn suspend(&mut self) {
        if self.status == SessionStatus::Tracing {
            self.status = SessionStatus::Suspended;
            info!("tracing suspended");
        } else {
            debug!("suspend: session is not tracing");
        }
    }

    pub fn resume(&mut self) {
        if self.status == SessionStatus::Suspended {
            // a fresh instruction window and a fresh clock
            self.counters.window_instructions = 0;
            self.started = Some(Instant::now());
            self.status = SessionStatus::Tracing;
            info!("tracing resumed");
        } else {
            debug!("resume: session is not suspended");
        }
    }

    // Any state -> Idle. The log stays valid for solving until the next reset.
    pub fn stop_tracing(&mut self) {
        if self.status != SessionStatus::Idle {
            self.status = SessionStatus::Idle;
            self.started = None;
            info!("tracing stopped");
        }
    }

    // Start-of-session cleanup: empties the log, zeroes the counters and
    // returns to Idle. Every bound handed out before this call is stale.
    pub fn reset_session(&mut self) {
        self.log.clear();
        self.counters = TraceCounters::default();
        self.status = SessionStatus::Idle;
        self.started = None;
        info!("session reset; path log cleared");
    }

    // Drive one traced instruction through the engine: enforce limits, count,
    // and record the branch when it is a symbolized conditional. Engine
    // failures on single instructions come back in the outcome, not as Err.
    pub fn trace_step<E>(
        &mut self,
        engine: &mut E,
        opcode: &[u8],
        address: u64,
        thread_id: u32,
    ) -> Result<StepOutcome, Error>
    where
        E: SymbolicEngine<'ctx>,
    {
        if self.status != SessionStatus::Tracing {
            return Ok(StepOutcome::NotTracing);
        }
        if let Some(limit) = self.options.instruction_limit {
            if self.counters.window_instructions >= limit {
                let window = self.counters.window_instructions;
                warn!("instruction budget of {} used up; suspending", limit);
                self.suspend();
                return Ok(StepOutcome::InstructionLimit { window });
            }
        }
        if let (Some(limit), Some(started)) = (self.options.time_limit(), self.started) {
            let elapsed = started.elapsed();
            if elapsed >= limit {
                warn!("time budget of {}s used up; suspending", limit.as_secs());
                self.suspend();
                return Ok(StepOutcome::TimeLimit { elapsed });
            }
        }

        // every traced event consumes window budget, supported or not
        self.counters.traced_instructions += 1;
        self.counters.window_instructions += 1;

        let instruction = match engine.process_instruction(opcode, address, thread_id) {
            Ok(instruction) => instruction,
            Err(err) => {
                warn!("skipping instruction at {:#x}: {}", address, err);
                return Ok(StepOutcome::Unsupported { address });
            }
        };

        if instruction.is_tainted() || instruction.is_symbolized() {
            self.counters.symbolic_instructions += 1;
            if instruction.is_branch() {
                self.counters.symbolic_branches += 1;
            }
        }

        // only a symbolic engine produces predicates worth recording
        let recorded = if instruction.is_branch()
            && instruction.is_symbolized()
            && self.options.engine_mode == EngineMode::Symbolic
        {
            self.record_branch(engine, &instruction)?
        } else {
            None
        };
        Ok(StepOutcome::Traced { recorded })
    }

    // Append one path record for a symbolized conditional branch. The
    // taken/not-taken successor pair follows the runtime outcome: the
    // immediate target when the jump fired, the fallthrough otherwise.
    // None when the branch cannot be recorded.
    pub fn record_branch<E>(
        &mut self,
        engine: &E,
        instruction: &ProcessedInstruction,
    ) -> Result<Option<usize>, Error>
    where
        E: SymbolicEngine<'ctx>,
    {
        let taken = match instruction.branch_taken() {
            Some(taken) => taken,
            None => return Ok(None),
        };
        let target = match instruction.immediate_operand(0) {
            Some(target) => target,
            None => {
                warn!(
                    "branch at {:#x} has no immediate target; not recording",
                    instruction.address
                );
                return Ok(None);
            }
        };
        let mut native = engine.path_constraints();
        let newest = match native.pop() {
            Some(constraint) => constraint,
            None => {
                warn!(
                    "engine reported no constraint for the branch at {:#x}; not recording",
                    instruction.address
                );
                return Ok(None);
            }
        };
        let register_id = engine.symbolic_register("rip")?;
        let fallthrough = instruction.next_address();
        let (taken_address, not_taken_address) = if taken {
            (target, fallthrough)
        } else {
            (fallthrough, target)
        };
        let record = PathConstraint::new(
            register_id,
            instruction.address,
            taken_address,
            not_taken_address,
            newest.branches,
        );
        Ok(Some(self.log.append(record)))
    }

    // Solve for inputs that force the branch at `bound` down an untaken
    // direction, see solver::negate::solve.
    pub fn solve<E>(
        &self,
        engine: &mut E,
        pc: u64,
        bound: usize,
        user_constraints: &BTreeMap<u64, Bool<'ctx>>,
    ) -> Result<Vec<Input>, Error>
    where
        E: SymbolicEngine<'ctx>,
    {
        negate::solve(self.ctx, engine, &self.log, pc, bound, user_constraints)
    }

    // Solve and apply the first solution, if any.
    pub fn solve_and_apply<E, H>(
        &self,
        engine: &mut E,
        host: &mut H,
        pc: u64,
        bound: usize,
        user_constraints: &BTreeMap<u64, Bool<'ctx>>,
    ) -> Result<Option<Input>, Error>
    where
        E: SymbolicEngine<'ctx>,
        H: DebuggerHost,
    {
        negate::solve_and_apply(
            self.ctx,
            engine,
            host,
            &self.log,
            pc,
            bound,
            user_constraints,
        )
    }
}
