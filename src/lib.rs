pub mod engine;
pub mod session;
pub mod solver;

pub use engine::host::{DebuggerHost, HostError};
pub use engine::{EngineError, SymbolicEngine};
pub use session::{SessionOptions, SessionStatus, StepOutcome, TraceSession};
pub use solver::{negate_by_flags, ConditionCode, Error, Flags, Input};
