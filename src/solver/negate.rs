use std::collections::BTreeMap;

use log::{debug, warn};
use z3::ast::Bool;
use z3::Context;

use crate::engine::host::DebuggerHost;
use crate::engine::{SymbolicEngine, SymbolicVariable, VariableOrigin};
use crate::solver::input::Input;
use crate::solver::path_log::PathLog;
use crate::solver::Error;

// Conjunction of the taken predicates of records [0, bound) plus every
// user constraint. Satisfiable by at least the observed execution prefix.
pub fn assemble_prefix<'ctx>(
    ctx: &'ctx Context,
    log: &PathLog<'ctx>,
    bound: usize,
    user_constraints: &BTreeMap<u64, Bool<'ctx>>,
) -> Result<Bool<'ctx>, Error> {
    log.check_bound(bound)?;
    // the seed makes bound 0 a plain tautology under the user constraints
    let seed = Bool::from_bool(ctx, true);
    let mut terms: Vec<&Bool<'ctx>> = Vec::with_capacity(1 + user_constraints.len() + bound);
    terms.push(&seed);
    terms.extend(user_constraints.values());
    for record in &log.records()[..bound] {
        match record.taken() {
            Some(branch) => terms.push(&branch.predicate),
            None => warn!(
                "record {} at {:#x} has no taken predicate; prefix skips it",
                record.bound, record.branch_address
            ),
        }
    }
    Ok(Bool::and(ctx, &terms))
}

/// Negate the branch recorded at `bound`: conjoin each not-taken predicate
/// with the path prefix and ask the solver for a model. Every satisfiable
/// alternative yields one `Input`. Solved values land in the engine's
/// concrete store right away, so later solves see consistent state.
///
/// `pc` must be the address of the branch the caller means to negate; a
/// mismatch with the record at `bound` signals a stale bound.
pub fn solve<'ctx, E>(
    ctx: &'ctx Context,
    engine: &mut E,
    log: &PathLog<'ctx>,
    pc: u64,
    bound: usize,
    user_constraints: &BTreeMap<u64, Bool<'ctx>>,
) -> Result<Vec<Input>, Error>
where
    E: SymbolicEngine<'ctx>,
{
    let record = log.check_bound(bound)?;
    if record.branch_address != pc {
        return Err(Error::BoundAddressMismatch {
            bound,
            requested: pc,
            actual: record.branch_address,
        });
    }
    let prefix = assemble_prefix(ctx, log, bound, user_constraints)?;
    let mut inputs = Vec::new();
    for alternative in record.not_taken() {
        let formula = Bool::and(ctx, &[&prefix, &alternative.predicate]);
        debug!(
            "formula for {:#x} -> {:#x}:\n{}",
            record.branch_address, alternative.destination_address, formula
        );
        let model = engine.get_model(&formula)?;
        if model.is_empty() {
            debug!(
                "{:#x} -> {:#x} is unreachable under the recorded path",
                record.branch_address, alternative.destination_address
            );
            continue;
        }
        let mut input = Input::new(bound, record.branch_address, alternative.destination_address);
        for (&id, &value) in &model {
            let variable = engine.symbolic_variable(id)?;
            log_solved_value(&variable, value);
            match variable.origin {
                VariableOrigin::Memory(cell) => {
                    engine.set_concrete_memory_value(cell, value)?;
                    input.memory_operands.push(cell);
                }
                VariableOrigin::Register(register) => {
                    if value > u64::MAX as u128 {
                        warn!(
                            "{} solved to {:#x}; the register store keeps the low 8 bytes",
                            register, value
                        );
                    }
                    engine.set_concrete_register_value(&register, value as u64)?;
                    input.register_operands.push(register);
                }
            }
        }
        inputs.push(input);
    }
    debug!("bound {} produced {} input(s)", bound, inputs.len());
    Ok(inputs)
}

// Solve and apply the first solution to the live process, if any.
pub fn solve_and_apply<'ctx, E, H>(
    ctx: &'ctx Context,
    engine: &mut E,
    host: &mut H,
    log: &PathLog<'ctx>,
    pc: u64,
    bound: usize,
    user_constraints: &BTreeMap<u64, Bool<'ctx>>,
) -> Result<Option<Input>, Error>
where
    E: SymbolicEngine<'ctx>,
    H: DebuggerHost,
{
    let mut inputs = solve(ctx, engine, log, pc, bound, user_constraints)?;
    if inputs.is_empty() {
        return Ok(None);
    }
    let input = inputs.remove(0);
    input.apply(engine, host)?;
    Ok(Some(input))
}

fn log_solved_value(variable: &SymbolicVariable, value: u128) {
    match display_value(variable.size, value) {
        Some(text) => debug!("  {} = {}", variable.name(), text),
        None => warn!(
            "{} is {} bits wide; no display form above 64 bits (raw {:#x})",
            variable.name(),
            variable.size,
            value
        ),
    }
}

// Human-readable form of a solved value, by operand width.
fn display_value(size: u32, value: u128) -> Option<String> {
    let text = match size {
        8 => {
            let byte = value as u8;
            let ch = if (0x20..=0x7e).contains(&byte) {
                byte as char
            } else {
                '.'
            };
            format!("{:#04x} ({})", byte, ch)
        }
        16 => format!("{:#06x}", value as u16),
        32 => format!("{:#010x}", value as u32),
        64 => format!("{:#018x}", value as u64),
        _ => return None,
    };
    Some(text)
}
