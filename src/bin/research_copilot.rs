//! CLI: run, resume and inspect research-copilot pipeline runs.
//!
//! Usage:
//!   research_copilot run --documents papers/
//!   research_copilot run --documents papers/ --until summarize
//!   research_copilot resume outputs/run_20260214_101500
//!   research_copilot status outputs/run_20260214_101500
//!   research_copilot check
//!   research_copilot compare --documents papers/ --params 0.1,42 --params 0.5,42
//!
//! Set RUST_LOG=research_copilot=trace for span enter/exit and per-call events.

use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use research_copilot::backend::{GenerativeBackend, OllamaBackend};
use research_copilot::compare::{ComparisonOutcome, REPORT_FILENAME};
use research_copilot::pipeline::Selection;
use research_copilot::runner::{RunReport, StatusReport};
use research_copilot::stages::{StageWorkers, TextDirectoryExtractor};
use research_copilot::{
  CancelToken, CompareOptions, ComparisonReport, LoopOptions, ParameterSet, PipelineError,
  RunAborted, RunConfig, RunOptions, RunStatus, Stage, check_endpoints, compare_parameters,
  pipeline_status, resume_pipeline, run_pipeline,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

const DEFAULT_OUTPUT_DIR: &str = "outputs";
const ENV_OUTPUT_DIR: &str = "COPILOT_OUTPUT_DIR";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "research_copilot", version)]
#[command(
  about = "Parse, summarize, synthesize and survey a directory of research papers",
  after_help = r#"Environment variables (override the matching flags when set):
  COPILOT_MODEL            Model name sent to the backend.
  COPILOT_PLANNING_HOST    Planning endpoint URL.
  COPILOT_EXECUTION_HOST   Execution endpoint URL (used by every generative stage).
  COPILOT_OUTPUT_DIR       Parent directory for run workspaces (default: outputs)."#
)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Start a new run in a fresh workspace.
  Run(RunArgs),
  /// Continue a stopped, aborted or cancelled run.
  Resume {
    #[arg(value_name = "RUN_DIR")]
    run_dir: PathBuf,
    /// Stop cleanly after this stage completes.
    #[arg(long, value_name = "STAGE")]
    until: Option<Stage>,
  },
  /// Print the replayed state of a run.
  Status {
    #[arg(value_name = "RUN_DIR")]
    run_dir: PathBuf,
  },
  /// List models on both endpoints and check the configured one is served.
  Check(ConfigArgs),
  /// Run the pipeline once per temperature/seed pair and recommend one.
  Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
  /// Directory containing .txt / .md source documents.
  #[arg(long, short = 'd', value_name = "DIR")]
  documents: PathBuf,

  /// Parent directory for the run workspace. Overridden by COPILOT_OUTPUT_DIR.
  #[arg(long, short = 'o', value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
  output_dir: PathBuf,

  /// Stop cleanly after this stage completes.
  #[arg(long, value_name = "STAGE")]
  until: Option<Stage>,

  #[command(flatten)]
  config: ConfigArgs,
}

#[derive(Args, Debug)]
struct CompareArgs {
  /// Directory containing .txt / .md source documents.
  #[arg(long, short = 'd', value_name = "DIR")]
  documents: PathBuf,

  /// Parent directory for the comparison directory. Overridden by COPILOT_OUTPUT_DIR.
  #[arg(long, short = 'o', value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
  output_dir: PathBuf,

  /// TEMPERATURE,SEED pair to try; repeat for more. Default: 0.1,42 0.3,42 0.5,42.
  #[arg(long = "params", value_name = "T,SEED", num_args = 1..)]
  params: Vec<ParameterSet>,

  #[command(flatten)]
  config: ConfigArgs,
}

#[derive(Args, Debug)]
struct ConfigArgs {
  /// JSON config file; missing fields take defaults.
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,

  #[arg(long)]
  model: Option<String>,

  #[arg(long)]
  temperature: Option<f32>,

  #[arg(long)]
  seed: Option<u64>,

  #[arg(long, value_name = "URL")]
  planning_host: Option<String>,

  #[arg(long, value_name = "URL")]
  execution_host: Option<String>,

  /// Maximum number of documents to parse.
  #[arg(long, value_name = "N")]
  max_documents: Option<usize>,

  /// Survey length limit in words.
  #[arg(long, value_name = "N")]
  word_limit: Option<usize>,
}

impl ConfigArgs {
  /// defaults → config file → flags → environment.
  fn resolve(&self) -> Result<RunConfig, PipelineError> {
    let mut config = match &self.config {
      Some(path) => RunConfig::load(path)?,
      None => RunConfig::default(),
    };
    if let Some(model) = &self.model {
      config.model = model.clone();
    }
    if let Some(t) = self.temperature {
      config.temperature = t;
    }
    if let Some(seed) = self.seed {
      config.seed = seed;
    }
    if let Some(host) = &self.planning_host {
      config.planning_endpoint = host.clone();
    }
    if let Some(host) = &self.execution_host {
      config.execution_endpoint = host.clone();
    }
    if let Some(n) = self.max_documents {
      config.max_documents = n;
    }
    if let Some(n) = self.word_limit {
      config.survey_word_limit = n;
    }
    config.apply_env_overrides(|key| env::var(key).ok());
    config.validate()?;
    Ok(config)
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .init();

  let cli = Cli::parse();
  let code = match cli.command {
    Command::Run(args) => run(args).await,
    Command::Resume { run_dir, until } => resume(&run_dir, until).await,
    Command::Status { run_dir } => status(&run_dir),
    Command::Check(args) => check(&args).await,
    Command::Compare(args) => compare(args).await,
  };
  process::exit(code);
}

async fn run(args: RunArgs) -> i32 {
  let config = match args.config.resolve() {
    Ok(c) => c,
    Err(e) => {
      eprintln!("Error: {}", e);
      return 1;
    }
  };
  let output_dir = resolve_output_dir(args.output_dir);
  info!(
    model = %config.model,
    execution = %config.execution_endpoint,
    output_dir = %output_dir.display(),
    "options (env or flags)"
  );
  let Some(transport) = transport() else {
    return 1;
  };
  let options = RunOptions {
    config,
    document_dir: &args.documents,
    output_dir: &output_dir,
    loop_options: loop_options(args.until),
  };
  report(run_pipeline(options, transport, &workers()).await)
}

async fn resume(run_dir: &Path, until: Option<Stage>) -> i32 {
  let Some(transport) = transport() else {
    return 1;
  };
  report(resume_pipeline(run_dir, loop_options(until), transport, &workers()).await)
}

fn status(run_dir: &Path) -> i32 {
  match pipeline_status(run_dir) {
    Ok(s) => {
      print_status(&s);
      0
    }
    Err(e) => {
      eprintln!("Error: {}", e);
      1
    }
  }
}

async fn check(args: &ConfigArgs) -> i32 {
  let config = match args.resolve() {
    Ok(c) => c,
    Err(e) => {
      eprintln!("Error: {}", e);
      return 1;
    }
  };
  let ollama = match OllamaBackend::new(CONNECT_TIMEOUT) {
    Ok(o) => o,
    Err(e) => {
      eprintln!("Error: {}", e);
      return 1;
    }
  };
  let mut ok = true;
  for c in check_endpoints(&config, &ollama).await {
    match &c.models {
      Ok(models) => println!(
        "{:?} {}: {} model(s), '{}' {}",
        c.endpoint.role,
        c.endpoint.url,
        models.len(),
        config.model,
        if c.model_available { "available" } else { "NOT served" }
      ),
      Err(e) => println!("{:?} {}: unreachable ({})", c.endpoint.role, c.endpoint.url, e),
    }
    ok &= c.model_available;
  }
  if ok { 0 } else { 1 }
}

async fn compare(args: CompareArgs) -> i32 {
  let config = match args.config.resolve() {
    Ok(c) => c,
    Err(e) => {
      eprintln!("Error: {}", e);
      return 1;
    }
  };
  let Some(transport) = transport() else {
    return 1;
  };
  let output_dir = resolve_output_dir(args.output_dir);
  let parameter_sets = if args.params.is_empty() {
    ParameterSet::defaults()
  } else {
    args.params
  };
  let options = CompareOptions {
    config,
    document_dir: &args.documents,
    output_dir: &output_dir,
    parameter_sets,
    cancel: loop_options(None).cancel,
  };
  match compare_parameters(options, transport, &workers()).await {
    Ok(report) => {
      print_comparison(&report);
      if report.recommended.is_some() { 0 } else { 1 }
    }
    Err(e) => {
      eprintln!("Error: {}", e);
      1
    }
  }
}

/// COPILOT_OUTPUT_DIR wins over the flag.
fn resolve_output_dir(flag: PathBuf) -> PathBuf {
  env::var(ENV_OUTPUT_DIR).ok().map(PathBuf::from).unwrap_or(flag)
}

fn transport() -> Option<Arc<dyn GenerativeBackend>> {
  match OllamaBackend::new(CONNECT_TIMEOUT) {
    Ok(o) => Some(Arc::new(o)),
    Err(e) => {
      eprintln!("Error: {}", e);
      None
    }
  }
}

fn workers() -> StageWorkers {
  StageWorkers::standard(Arc::new(TextDirectoryExtractor))
}

/// Ctrl-C requests cancellation; the loop stops before the next stage.
fn loop_options(until: Option<Stage>) -> LoopOptions {
  let cancel = CancelToken::new();
  let handle = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, stopping before the next stage");
      handle.cancel();
    }
  });
  LoopOptions {
    stop_after: until,
    cancel,
  }
}

fn report(result: Result<RunReport, RunAborted>) -> i32 {
  match result {
    Ok(r) => {
      match r.status {
        RunStatus::Complete => println!("Pipeline completed."),
        RunStatus::Stopped { after } => println!("Pipeline stopped after {}.", after),
      }
      println!("  Run: {}", r.run_id);
      println!("  Workspace: {}", r.run_dir.display());
      println!("  Trace: {}", r.trace_path.display());
      println!("  Completed stages: {:?}", r.state.completed_stages());
      0
    }
    Err(abort) => {
      eprintln!("Pipeline aborted: {}", abort.error);
      eprintln!("  Completed stages: {:?}", abort.state.completed_stages());
      match &abort.trace_path {
        Some(p) => eprintln!("  Trace: {}", p.display()),
        None => eprintln!("  No trace was written."),
      }
      1
    }
  }
}

fn print_status(s: &StatusReport) {
  println!("Run: {}", s.run_id);
  println!("  Workspace: {}", s.run_dir.display());
  println!("  Trace events: {}", s.events);
  for (stage, done) in s.state.flags() {
    println!(
      "  {:<11} {}  ({} artifact(s))",
      stage.as_str(),
      if *done { "completed" } else { "pending" },
      s.state.artifacts(*stage).len()
    );
  }
  match s.next {
    Some(Selection::Next(stage)) => println!("  Next stage: {}", stage),
    Some(Selection::Complete) => println!("  Pipeline complete."),
    None => println!("  Next stage: none (state inconsistent)"),
  }
  if let Some(last) = &s.last_status {
    println!("  Last run status: {}", last);
  }
}

fn print_comparison(r: &ComparisonReport) {
  println!(
    "{:<8} {:<8} {:<8} {:<10} {:<12} {:<10}",
    "Temp", "Seed", "Words", "Citations", "Avg Summary", "Time(s)"
  );
  println!("{}", "-".repeat(66));
  for entry in &r.results {
    let p = entry.params;
    match &entry.outcome {
      ComparisonOutcome::Success {
        duration_secs,
        metrics: m,
        ..
      } => println!(
        "{:<8} {:<8} {:<8} {:<10} {:<12.1} {:<10.2}",
        p.temperature, p.seed, m.word_count, m.citation_count, m.avg_summary_length, duration_secs
      ),
      ComparisonOutcome::Error { error, .. } => {
        println!("{:<8} {:<8} failed: {}", p.temperature, p.seed, error)
      }
    }
  }
  match r.recommended {
    Some(best) => println!(
      "Recommended: temperature {}, seed {} (most citations, length closest to {} words)",
      best.temperature, best.seed, r.target_words
    ),
    None => println!("No successful runs to compare."),
  }
  println!("Report: {}", r.comparison_dir.join(REPORT_FILENAME).display());
}
