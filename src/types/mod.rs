//! Pipeline types: stages, state, worker results, artifacts and trace records.
//!
//! These types are shared by the execution loop, the stage workers and the
//! trace/replay code; most of them serialize into the run workspace.

mod artifact;
mod backend_exchange;
mod documents;
mod pipeline_state;
mod stage;
mod stage_graph;
mod trace_event;
#[cfg(test)]
mod trace_event_test;
mod worker_result;

pub use artifact::{ArtifactKind, ArtifactRef};
pub use backend_exchange::{BackendExchange, ExchangeOutcome};
pub use documents::{
  PaperSummary, ParseFailureEntry, ParsedDocument, ParsedPaperEntry, ParsingSummary,
  SummarySections, Survey, Synthesis, SynthesisSections,
};
pub use pipeline_state::PipelineState;
pub use stage::Stage;
pub use stage_graph::{StageDescriptor, StageGraph};
pub use trace_event::{
  BackendCallData, BackendResponseData, DecisionData, DecisionOutcome, DispatchData, ErrorData,
  RunCompleteData, StageResultData, StateInitData, TraceEvent, TraceEventKind, TraceLevel,
};
pub use worker_result::{ItemError, ItemErrorKind, ResultKind, WorkerResult};
