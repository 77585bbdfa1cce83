pub mod flags;
pub mod input;
pub mod negate;
pub mod path_log;

pub use flags::{negate_by_flags, ConditionCode, Flags};
pub use input::Input;
pub use negate::{assemble_prefix, solve, solve_and_apply};
pub use path_log::{BranchConstraint, PathConstraint, PathLog};

use thiserror::Error;

use crate::engine::host::HostError;
use crate::engine::EngineError;

/// Failures of the negation core. An unsatisfiable negation is not a
/// failure and never surfaces here; it yields zero inputs instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bound {bound} is out of range for a path log of {len} records")]
    BoundOutOfRange { bound: usize, len: usize },
    #[error("record {bound} sits at {actual:#x}, not at the requested {requested:#x}")]
    BoundAddressMismatch {
        bound: usize,
        requested: u64,
        actual: u64,
    },
    #[error("{0} cannot be negated by flipping flags")]
    CannotNegateByFlags(ConditionCode),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Host(#[from] HostError),
}
