//! Orchestration: stage selection, the execution loop, and cancellation.

mod cancel;
mod execution_loop;
mod select_stage;

pub use cancel::CancelToken;
pub use execution_loop::{
  ExecutionLoop, LoopAbort, LoopEnv, LoopOptions, LoopOutcome, RunStatus,
};
pub use select_stage::{Selection, eligible_stages, select_next_stage};
