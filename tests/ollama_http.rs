//! OllamaBackend against a local axum server speaking the Ollama HTTP API.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{fast_config, write_corpus};
use research_copilot::backend::{
  Endpoint, EndpointRole, GenerativeBackend, OllamaBackend, TransportFailure,
};
use research_copilot::config::GenerationParams;
use research_copilot::stages::{StageWorkers, TextDirectoryExtractor};
use research_copilot::{RunConfig, RunOptions, RunStatus, check_endpoints, run_pipeline};
use serde_json::{Value, json};

async fn generate(Json(body): Json<Value>) -> impl IntoResponse {
  let model = body["model"].as_str().unwrap_or_default();
  let prompt = body["prompt"].as_str().unwrap_or_default();
  if model != "llama3.1" {
    return (
      StatusCode::NOT_FOUND,
      Json(json!({ "error": format!("model '{}' not found", model) })),
    );
  }
  if prompt == "boom" {
    return (
      StatusCode::INTERNAL_SERVER_ERROR,
      Json(json!({ "error": "out of memory" })),
    );
  }
  let text = format!(
    "echo seed={} stream={} len={}",
    body["options"]["seed"],
    body["stream"],
    prompt.len()
  );
  (StatusCode::OK, Json(json!({ "response": text, "done": true })))
}

async fn tags() -> Json<Value> {
  Json(json!({ "models": [{ "name": "llama3.1:latest" }, { "name": "mistral:7b" }] }))
}

/// Starts the stub server on an ephemeral port and returns its base URL.
async fn serve() -> String {
  let app = Router::new()
    .route("/api/generate", post(generate))
    .route("/api/tags", get(tags));
  let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
    .await
    .unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{}", addr)
}

fn params(model: &str) -> GenerationParams {
  GenerationParams {
    model: model.to_string(),
    temperature: 0.7,
    seed: 42,
    max_tokens: None,
  }
}

fn ollama() -> OllamaBackend {
  OllamaBackend::new(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn generate_returns_response_text() {
  let base = serve().await;
  let endpoint = Endpoint::new(EndpointRole::Execution, format!("{}/", base));
  let text = ollama()
    .generate(&endpoint, "hello", &params("llama3.1"))
    .await
    .unwrap();
  assert_eq!(text, "echo seed=42 stream=false len=5");
}

#[tokio::test]
async fn unknown_model_is_model_unavailable() {
  let base = serve().await;
  let endpoint = Endpoint::new(EndpointRole::Execution, base);
  let err = ollama()
    .generate(&endpoint, "hello", &params("gpt-oss"))
    .await
    .unwrap_err();
  match &err {
    TransportFailure::ModelUnavailable(body) => assert!(body.contains("not found")),
    other => panic!("expected ModelUnavailable, got {:?}", other),
  }
  assert!(!err.is_transient());
}

#[tokio::test]
async fn server_error_is_transient() {
  let base = serve().await;
  let endpoint = Endpoint::new(EndpointRole::Execution, base);
  let err = ollama()
    .generate(&endpoint, "boom", &params("llama3.1"))
    .await
    .unwrap_err();
  assert!(matches!(err, TransportFailure::Server { status: 500, .. }));
  assert!(err.is_transient());
}

#[tokio::test]
async fn closed_port_is_connect_failure() {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);
  let endpoint = Endpoint::new(EndpointRole::Execution, format!("http://{}", addr));
  let err = ollama()
    .generate(&endpoint, "hello", &params("llama3.1"))
    .await
    .unwrap_err();
  assert!(matches!(err, TransportFailure::Connect(_)), "{:?}", err);
  assert!(err.is_transient());
}

#[tokio::test]
async fn list_models_and_check_endpoints() {
  let base = serve().await;
  let endpoint = Endpoint::new(EndpointRole::Planning, base.clone());
  let models = ollama().list_models(&endpoint).await.unwrap();
  assert_eq!(models, vec!["llama3.1:latest", "mistral:7b"]);

  let config = RunConfig {
    planning_endpoint: base.clone(),
    execution_endpoint: base,
    ..RunConfig::default()
  };
  let checks = check_endpoints(&config, &ollama()).await;
  assert_eq!(checks.len(), 2);
  assert!(checks.iter().all(|c| c.model_available));

  let other = RunConfig {
    model: "phi3".to_string(),
    ..config
  };
  let checks = check_endpoints(&other, &ollama()).await;
  assert!(checks.iter().all(|c| !c.model_available && c.models.is_ok()));
}

#[tokio::test]
async fn pipeline_completes_over_http() {
  let base = serve().await;
  let docs = tempfile::tempdir().unwrap();
  let out = tempfile::tempdir().unwrap();
  write_corpus(docs.path());
  let config = RunConfig {
    planning_endpoint: base.clone(),
    execution_endpoint: base,
    ..fast_config()
  };
  let options = RunOptions {
    config,
    document_dir: docs.path(),
    output_dir: out.path(),
    loop_options: Default::default(),
  };
  let transport: Arc<dyn GenerativeBackend> = Arc::new(ollama());
  let workers = StageWorkers::standard(Arc::new(TextDirectoryExtractor));
  let report = run_pipeline(options, transport, &workers).await.unwrap();
  assert_eq!(report.status, RunStatus::Complete);
  assert!(report.state.all_completed());
}
