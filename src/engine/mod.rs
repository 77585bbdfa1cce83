pub mod host;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use z3::ast::Bool;

use crate::solver::path_log::BranchConstraint;

// Identifier the engine assigned to a symbolic variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u64);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymVar_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemoryCell {
    pub address: u64,
    pub size: u32, // width in bytes
}

impl MemoryCell {
    pub fn new(address: u64, size: u32) -> Self {
        MemoryCell { address, size }
    }
}

impl fmt::Display for MemoryCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x};{}]", self.address, self.size)
    }
}

// A register, named the way the hosting debugger names it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Register {
    pub name: String,
}

impl Register {
    pub fn new(name: impl Into<String>) -> Self {
        Register { name: name.into() }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// Where a symbolic variable was introduced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableOrigin {
    Memory(MemoryCell),
    Register(Register),
}

#[derive(Debug, Clone)]
pub struct SymbolicVariable {
    pub id: VarId,
    pub origin: VariableOrigin,
    pub size: u32,     // width in bits
    pub label: String, // engine-side name or symbolization comment, may be empty
}

impl SymbolicVariable {
    pub fn name(&self) -> String {
        if self.label.is_empty() {
            self.id.to_string()
        } else {
            self.label.clone()
        }
    }
}

// How the engine classified one processed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionClass {
    Other,
    ConditionalBranch {
        taken: bool, // runtime outcome, not static encoding
    },
}

#[derive(Debug, Clone)]
pub struct ProcessedInstruction {
    pub address: u64,
    pub next_address: u64, // fallthrough successor for a conditional branch
    pub tainted: bool,
    pub symbolized: bool,
    pub immediates: Vec<u64>, // a conditional jump carries its target as operand 0
    pub class: InstructionClass,
}

impl ProcessedInstruction {
    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub fn is_symbolized(&self) -> bool {
        self.symbolized
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.class, InstructionClass::ConditionalBranch { .. })
    }

    pub fn next_address(&self) -> u64 {
        self.next_address
    }

    pub fn immediate_operand(&self, index: usize) -> Option<u64> {
        self.immediates.get(index).copied()
    }

    pub fn branch_taken(&self) -> Option<bool> {
        match self.class {
            InstructionClass::ConditionalBranch { taken } => Some(taken),
            InstructionClass::Other => None,
        }
    }
}

// The predicate alternatives of a single symbolized branch, engine-native.
#[derive(Debug, Clone)]
pub struct EngineConstraint<'ctx> {
    pub branches: Vec<BranchConstraint<'ctx>>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine cannot process the instruction at {address:#x}")]
    UnsupportedInstruction { address: u64 },
    #[error("no symbolic variable is registered under {0}")]
    UnknownVariable(VarId),
    #[error("register {0} has no symbolic variable")]
    UnknownRegister(String),
    #[error("solver backend: {0}")]
    Solver(String),
    #[error("concrete store: {0}")]
    Store(String),
}

/// The symbolic execution engine this library drives. Implementations own
/// instruction semantics, taint propagation and the concrete-value store;
/// predicates cross the boundary as `z3` terms over a shared context.
pub trait SymbolicEngine<'ctx> {
    fn process_instruction(
        &mut self,
        opcode: &[u8],
        address: u64,
        thread_id: u32,
    ) -> Result<ProcessedInstruction, EngineError>;

    // Engine-native path-constraint records, in encounter order. The newest
    // entry belongs to the most recently processed symbolized branch.
    fn path_constraints(&self) -> Vec<EngineConstraint<'ctx>>;

    fn symbolic_register(&self, name: &str) -> Result<VarId, EngineError>;

    fn symbolic_variable(&self, id: VarId) -> Result<SymbolicVariable, EngineError>;

    // Ask the solver for a satisfying assignment of the formula. An empty
    // mapping means unsatisfiable; solver breakage is an error.
    fn get_model(&self, formula: &Bool<'ctx>) -> Result<BTreeMap<VarId, u128>, EngineError>;

    fn get_concrete_memory_value(&self, cell: MemoryCell) -> Result<u128, EngineError>;

    fn set_concrete_memory_value(&mut self, cell: MemoryCell, value: u128)
        -> Result<(), EngineError>;

    // Mark the cell concrete so symbolic propagation stops tracking it.
    fn concretize_memory(&mut self, cell: MemoryCell) -> Result<(), EngineError>;

    fn get_concrete_register_value(&self, register: &Register) -> Result<u64, EngineError>;

    fn set_concrete_register_value(
        &mut self,
        register: &Register,
        value: u64,
    ) -> Result<(), EngineError>;

    fn concretize_register(&mut self, register: &Register) -> Result<(), EngineError>;
}
