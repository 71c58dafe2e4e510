//! Retrying backend client bound to one endpoint.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tracing::{debug, instrument, warn};

use super::{Endpoint, GenerativeBackend, TransportFailure};
use crate::config::{GenerationParams, RetryPolicy, RunConfig};
use crate::error::BackendError;
use crate::types::{BackendExchange, ExchangeOutcome};

/// Result of one logical `generate` call plus every attempt it took.
#[derive(Debug, Clone)]
pub struct Generation {
  pub result: Result<String, BackendError>,
  pub exchanges: Vec<BackendExchange>,
}

impl Generation {
  pub fn into_parts(self) -> (Result<String, BackendError>, Vec<BackendExchange>) {
    (self.result, self.exchanges)
  }
}

/// Exchanges of every call made during one stage execution.
///
/// Owned by the execution loop and drained after the worker returns, whether it
/// returned a result or an error, so no completed call is lost from the trace.
#[derive(Debug, Default)]
pub struct ExchangeRecorder {
  exchanges: Mutex<Vec<BackendExchange>>,
}

impl ExchangeRecorder {
  pub fn record(&self, mut exchanges: Vec<BackendExchange>) {
    self
      .exchanges
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .append(&mut exchanges);
  }

  /// Removes and returns everything recorded so far.
  pub fn take(&self) -> Vec<BackendExchange> {
    std::mem::take(&mut *self.exchanges.lock().unwrap_or_else(PoisonError::into_inner))
  }
}

/// Stateless client: holds only immutable settings, so one instance can be
/// shared by concurrent summarizer calls.
#[derive(Clone)]
pub struct BackendClient {
  transport: Arc<dyn GenerativeBackend>,
  endpoint: Endpoint,
  retry: RetryPolicy,
  timeout: Duration,
  jitter: bool,
}

impl std::fmt::Debug for BackendClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BackendClient")
      .field("endpoint", &self.endpoint)
      .field("retry", &self.retry)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

impl BackendClient {
  pub fn new(
    transport: Arc<dyn GenerativeBackend>,
    endpoint: Endpoint,
    retry: RetryPolicy,
    timeout: Duration,
  ) -> Self {
    Self {
      transport,
      endpoint,
      retry,
      timeout,
      jitter: true,
    }
  }

  /// Client for the execution endpoint with retry and timeout from `config`.
  pub fn for_execution(transport: Arc<dyn GenerativeBackend>, config: &RunConfig) -> Self {
    Self::new(
      transport,
      Endpoint::from_config(config, super::EndpointRole::Execution),
      config.retry.clone(),
      config.request_timeout(),
    )
  }

  /// Disables random jitter on backoff delays.
  pub fn without_jitter(mut self) -> Self {
    self.jitter = false;
    self
  }

  pub fn endpoint(&self) -> &Endpoint {
    &self.endpoint
  }

  /// Sends `prompt` to the endpoint.
  ///
  /// Transient failures (timeout, connect, 5xx) are retried up to
  /// `retry.max_retries` times with capped exponential backoff, then surface as
  /// [BackendError::Transport]. Anything else surfaces at once as
  /// [BackendError::Unavailable]. Every attempt is recorded in
  /// [Generation::exchanges].
  #[instrument(level = "trace", skip(self, prompt, params), fields(endpoint = %self.endpoint))]
  pub async fn generate(
    &self,
    source_id: Option<&str>,
    prompt: &str,
    params: &GenerationParams,
  ) -> Generation {
    let max_attempts = self.retry.max_attempts();
    let mut exchanges = Vec::new();
    let mut attempt = 0;
    loop {
      attempt += 1;
      let sent_at = Utc::now();
      let started = Instant::now();
      let outcome = match tokio::time::timeout(
        self.timeout,
        self.transport.generate(&self.endpoint, prompt, params),
      )
      .await
      {
        Ok(r) => r,
        Err(_) => Err(TransportFailure::Timeout(format!(
          "no response within {}s",
          self.timeout.as_secs_f64()
        ))),
      };
      let elapsed_ms = started.elapsed().as_millis() as u64;
      let record = |outcome: ExchangeOutcome| BackendExchange {
        source_id: source_id.map(String::from),
        endpoint: self.endpoint.url.clone(),
        attempt,
        prompt: prompt.to_string(),
        sent_at,
        elapsed_ms,
        outcome,
      };

      match outcome {
        Ok(text) => {
          debug!(attempt, elapsed_ms, "backend call succeeded");
          exchanges.push(record(ExchangeOutcome::Response { text: text.clone() }));
          return Generation {
            result: Ok(text),
            exchanges,
          };
        }
        Err(failure) => {
          let transient = failure.is_transient();
          exchanges.push(record(ExchangeOutcome::Failure {
            message: failure.to_string(),
            transient,
          }));
          if !transient {
            return Generation {
              result: Err(BackendError::Unavailable {
                endpoint: self.endpoint.url.clone(),
                message: failure.to_string(),
              }),
              exchanges,
            };
          }
          if attempt >= max_attempts {
            warn!(attempt, error = %failure, "backend retries exhausted");
            return Generation {
              result: Err(BackendError::Transport {
                endpoint: self.endpoint.url.clone(),
                attempts: attempt,
                message: failure.to_string(),
              }),
              exchanges,
            };
          }
          let delay = self.delay(attempt);
          warn!(attempt, delay_ms = delay.as_millis() as u64, error = %failure, "transient backend failure, retrying");
          tokio::time::sleep(delay).await;
        }
      }
    }
  }

  fn delay(&self, retry: u32) -> Duration {
    let base = self.retry.backoff(retry);
    if !self.jitter || base.is_zero() {
      return base;
    }
    let spread = (base.as_millis() as u64 / 4).max(1);
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
  }
}
