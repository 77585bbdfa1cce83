#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use desvio::engine::host::{DebuggerHost, HostError};
use desvio::engine::{
    EngineConstraint, EngineError, InstructionClass, MemoryCell, ProcessedInstruction, Register,
    SymbolicEngine, SymbolicVariable, VarId, VariableOrigin,
};
use desvio::solver::BranchConstraint;
use z3::ast::{Bool, BV};
use z3::{Config, Context, Model, SatResult, Solver};

pub fn leaked_context() -> &'static Context {
    let cfg = Config::new();
    Box::leak(Box::new(Context::new(&cfg)))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Engine double: variables and constraints are staged by the test, models
/// come from a real z3 solver, instruction outcomes are scripted.
pub struct ScriptedEngine<'ctx> {
    pub ctx: &'ctx Context,
    variables: BTreeMap<VarId, (SymbolicVariable, BV<'ctx>)>,
    next_id: u64,
    constraints: Vec<EngineConstraint<'ctx>>,
    steps: VecDeque<Result<ProcessedInstruction, EngineError>>,
    pub memory: BTreeMap<u64, u128>,
    pub registers: BTreeMap<String, u64>,
    pub concretized_memory: BTreeSet<u64>,
    pub concretized_registers: BTreeSet<String>,
}

impl<'ctx> ScriptedEngine<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        let mut engine = ScriptedEngine {
            ctx,
            variables: BTreeMap::new(),
            next_id: 0,
            constraints: Vec::new(),
            steps: VecDeque::new(),
            memory: BTreeMap::new(),
            registers: BTreeMap::new(),
            concretized_memory: BTreeSet::new(),
            concretized_registers: BTreeSet::new(),
        };
        // the instruction pointer is symbolized for the whole session
        engine.add_variable(VariableOrigin::Register(Register::new("rip")), 64, "rip");
        engine
    }

    fn add_variable(
        &mut self,
        origin: VariableOrigin,
        size: u32,
        label: &str,
    ) -> (VarId, BV<'ctx>) {
        let id = VarId(self.next_id);
        self.next_id += 1;
        let bv = BV::new_const(self.ctx, format!("SymVar_{}", id.0), size);
        let variable = SymbolicVariable {
            id,
            origin,
            size,
            label: label.to_string(),
        };
        self.variables.insert(id, (variable, bv.clone()));
        (id, bv)
    }

    pub fn symbolize_memory(
        &mut self,
        address: u64,
        size_bits: u32,
        label: &str,
    ) -> (VarId, BV<'ctx>) {
        let cell = MemoryCell::new(address, size_bits.div_ceil(8));
        self.add_variable(VariableOrigin::Memory(cell), size_bits, label)
    }

    pub fn symbolize_register(&mut self, name: &str, size_bits: u32) -> (VarId, BV<'ctx>) {
        self.add_variable(
            VariableOrigin::Register(Register::new(name)),
            size_bits,
            name,
        )
    }

    /// Stage one engine-native path-constraint record.
    pub fn push_constraint(&mut self, branches: Vec<BranchConstraint<'ctx>>) {
        self.constraints.push(EngineConstraint { branches });
    }

    /// Queue the outcome of the next `process_instruction` call.
    pub fn push_step(&mut self, step: Result<ProcessedInstruction, EngineError>) {
        self.steps.push_back(step);
    }
}

impl<'ctx> SymbolicEngine<'ctx> for ScriptedEngine<'ctx> {
    fn process_instruction(
        &mut self,
        _opcode: &[u8],
        address: u64,
        _thread_id: u32,
    ) -> Result<ProcessedInstruction, EngineError> {
        match self.steps.pop_front() {
            Some(step) => step,
            None => Err(EngineError::UnsupportedInstruction { address }),
        }
    }

    fn path_constraints(&self) -> Vec<EngineConstraint<'ctx>> {
        self.constraints.clone()
    }

    fn symbolic_register(&self, name: &str) -> Result<VarId, EngineError> {
        self.variables
            .values()
            .find_map(|(variable, _)| match &variable.origin {
                VariableOrigin::Register(register) if register.name == name => Some(variable.id),
                _ => None,
            })
            .ok_or_else(|| EngineError::UnknownRegister(name.to_string()))
    }

    fn symbolic_variable(&self, id: VarId) -> Result<SymbolicVariable, EngineError> {
        self.variables
            .get(&id)
            .map(|(variable, _)| variable.clone())
            .ok_or(EngineError::UnknownVariable(id))
    }

    fn get_model(&self, formula: &Bool<'ctx>) -> Result<BTreeMap<VarId, u128>, EngineError> {
        let solver = Solver::new(self.ctx);
        solver.assert(formula);
        match solver.check() {
            SatResult::Sat => {
                let model = solver
                    .get_model()
                    .ok_or_else(|| EngineError::Solver("sat without a model".to_string()))?;
                let mut assignment = BTreeMap::new();
                for (id, (variable, bv)) in &self.variables {
                    if let Some(value) = eval_bits(&model, bv, variable.size) {
                        assignment.insert(*id, value);
                    }
                }
                Ok(assignment)
            }
            SatResult::Unsat => Ok(BTreeMap::new()),
            SatResult::Unknown => Err(EngineError::Solver("solver returned unknown".to_string())),
        }
    }

    fn get_concrete_memory_value(&self, cell: MemoryCell) -> Result<u128, EngineError> {
        Ok(self.memory.get(&cell.address).copied().unwrap_or(0))
    }

    fn set_concrete_memory_value(
        &mut self,
        cell: MemoryCell,
        value: u128,
    ) -> Result<(), EngineError> {
        self.memory.insert(cell.address, value);
        Ok(())
    }

    fn concretize_memory(&mut self, cell: MemoryCell) -> Result<(), EngineError> {
        self.concretized_memory.insert(cell.address);
        Ok(())
    }

    fn get_concrete_register_value(&self, register: &Register) -> Result<u64, EngineError> {
        Ok(self.registers.get(&register.name).copied().unwrap_or(0))
    }

    fn set_concrete_register_value(
        &mut self,
        register: &Register,
        value: u64,
    ) -> Result<(), EngineError> {
        self.registers.insert(register.name.clone(), value);
        Ok(())
    }

    fn concretize_register(&mut self, register: &Register) -> Result<(), EngineError> {
        self.concretized_registers.insert(register.name.clone());
        Ok(())
    }
}

// Evaluate a bit-vector in the model, reading wide values in two halves.
fn eval_bits<'ctx>(model: &Model<'ctx>, bv: &BV<'ctx>, size: u32) -> Option<u128> {
    if size <= 64 {
        model.eval(bv, false).and_then(|v| v.as_u64()).map(u128::from)
    } else {
        let low = model.eval(&bv.extract(63, 0), false)?.as_u64()?;
        let high = model.eval(&bv.extract(size.min(128) - 1, 64), false)?.as_u64()?;
        Some((u128::from(high) << 64) | u128::from(low))
    }
}

/// Host double: flat register and byte maps, absent entries read as zero.
#[derive(Debug, Default)]
pub struct MockHost {
    pub registers: BTreeMap<String, u64>,
    pub memory: BTreeMap<u64, u8>,
}

impl MockHost {
    pub fn new() -> Self {
        MockHost::default()
    }

    pub fn memory_bytes(&self, address: u64, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                self.memory
                    .get(&(address + i as u64))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    }
}

impl DebuggerHost for MockHost {
    fn read_register(&self, name: &str) -> Result<u64, HostError> {
        Ok(self.registers.get(name).copied().unwrap_or(0))
    }

    fn write_register(&mut self, name: &str, value: u64) -> Result<(), HostError> {
        self.registers.insert(name.to_string(), value);
        Ok(())
    }

    fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<(), HostError> {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self
                .memory
                .get(&(address + i as u64))
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<(), HostError> {
        for (i, byte) in bytes.iter().enumerate() {
            self.memory.insert(address + i as u64, *byte);
        }
        Ok(())
    }
}

/// Two-way branch tuples: the observed direction first, the alternative
/// second.
pub fn branch_pair<'ctx>(
    src: u64,
    taken_to: u64,
    not_taken_to: u64,
    taken_predicate: Bool<'ctx>,
    not_taken_predicate: Bool<'ctx>,
) -> Vec<BranchConstraint<'ctx>> {
    vec![
        BranchConstraint {
            taken: true,
            source_address: src,
            destination_address: taken_to,
            predicate: taken_predicate,
        },
        BranchConstraint {
            taken: false,
            source_address: src,
            destination_address: not_taken_to,
            predicate: not_taken_predicate,
        },
    ]
}

pub fn conditional_branch(address: u64, len: u64, target: u64, taken: bool) -> ProcessedInstruction {
    ProcessedInstruction {
        address,
        next_address: address + len,
        tainted: false,
        symbolized: true,
        immediates: vec![target],
        class: InstructionClass::ConditionalBranch { taken },
    }
}

pub fn plain_instruction(address: u64, len: u64) -> ProcessedInstruction {
    ProcessedInstruction {
        address,
        next_address: address + len,
        tainted: false,
        symbolized: false,
        immediates: Vec::new(),
        class: InstructionClass::Other,
    }
}
