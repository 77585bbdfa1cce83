use log::{debug, warn};
use z3::ast::Bool;

use crate::engine::VarId;
use crate::solver::Error;

/// One alternative of a recorded branch: the predicate under which control
/// flows from `source_address` to `destination_address`.
#[derive(Debug, Clone)]
pub struct BranchConstraint<'ctx> {
    pub taken: bool,
    pub source_address: u64,
    pub destination_address: u64,
    pub predicate: Bool<'ctx>,
}

/// One record per executed symbolized conditional branch, immutable once appended.
#[derive(Debug, Clone)]
pub struct PathConstraint<'ctx> {
    pub register_id: VarId, // instruction-pointer variable at branch time
    pub branch_address: u64,
    pub taken_address: u64,
    pub not_taken_address: u64,
    pub bound: usize, // index in the log, stable for the whole session
    pub branches: Vec<BranchConstraint<'ctx>>, // exactly one has taken == true
}

impl<'ctx> PathConstraint<'ctx> {
    pub fn new(
        register_id: VarId,
        branch_address: u64,
        taken_address: u64,
        not_taken_address: u64,
        branches: Vec<BranchConstraint<'ctx>>,
    ) -> Self {
        PathConstraint {
            register_id,
            branch_address,
            taken_address,
            not_taken_address,
            bound: 0, // assigned by the log on append
            branches,
        }
    }

    pub fn taken(&self) -> Option<&BranchConstraint<'ctx>> {
        self.branches.iter().find(|branch| branch.taken)
    }

    pub fn not_taken(&self) -> impl Iterator<Item = &BranchConstraint<'ctx>> {
        self.branches.iter().filter(|branch| !branch.taken)
    }
}

/// Append-only log of the symbolized conditional branches executed so far.
/// A record's `bound` is its index here; indices are stable until `clear`.
#[derive(Debug, Default)]
pub struct PathLog<'ctx> {
    records: Vec<PathConstraint<'ctx>>,
}

impl<'ctx> PathLog<'ctx> {
    pub fn new() -> Self {
        PathLog {
            records: Vec::new(),
        }
    }

    pub fn append(&mut self, mut record: PathConstraint<'ctx>) -> usize {
        record.bound = self.records.len();
        debug!(
            "path constraint {} at {:#x}: taken {:#x}, not taken {:#x}",
            record.bound, record.branch_address, record.taken_address, record.not_taken_address
        );
        if record.taken().is_none() {
            warn!(
                "record {} at {:#x} has no taken alternative",
                record.bound, record.branch_address
            );
        }
        let bound = record.bound;
        self.records.push(record);
        bound
    }

    /// Empty the log. Only valid at a session boundary; stale bounds from
    /// before the clear must not be reused.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, bound: usize) -> Option<&PathConstraint<'ctx>> {
        self.records.get(bound)
    }

    pub fn records(&self) -> &[PathConstraint<'ctx>] {
        &self.records
    }

    // An empty log rejects every bound.
    pub fn check_bound(&self, bound: usize) -> Result<&PathConstraint<'ctx>, Error> {
        self.records.get(bound).ok_or(Error::BoundOutOfRange {
            bound,
            len: self.records.len(),
        })
    }
}
