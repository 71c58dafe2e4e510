//! One request/response pair exchanged with the generative backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a single backend attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExchangeOutcome {
  Response { text: String },
  Failure { message: String, transient: bool },
}

/// Record of one attempt. Workers collect these; the loop writes them to the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendExchange {
  /// Document the call was made for, if any.
  pub source_id: Option<String>,
  /// Endpoint base URL.
  pub endpoint: String,
  /// 1-based attempt number within one `generate` call.
  pub attempt: u32,
  pub prompt: String,
  pub sent_at: DateTime<Utc>,
  pub elapsed_ms: u64,
  pub outcome: ExchangeOutcome,
}

impl BackendExchange {
  pub fn is_response(&self) -> bool {
    matches!(self.outcome, ExchangeOutcome::Response { .. })
  }
}
