//! Binary entrypoint: read one AnalysisRequest JSON document from stdin,
//! write one AnalysisReport JSON document to stdout.
//!
//! Invalid input produces an ErrorOutput document and a non-zero exit.
//! Logs go to stderr so stdout stays machine-readable. No argument parsing;
//! the request document carries everything, including configuration.

use std::io::{self, Read, Write};

use cascade_engine::types::ErrorOutput;
use cascade_engine::{Engine, EngineError};
use tracing_subscriber::EnvFilter;

fn emit_error(err: ErrorOutput) -> ! {
  let stdout = io::stdout();
  let mut out = stdout.lock();
  let _ = serde_json::to_writer(&mut out, &err);
  let _ = writeln!(out);
  std::process::exit(1);
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let mut input = String::new();
  if let Err(e) = io::stdin().read_to_string(&mut input) {
    let _ = writeln!(io::stderr(), "cascade-engine: read error: {}", e);
    std::process::exit(1);
  }

  let request: cascade_engine::AnalysisRequest = match serde_json::from_str(&input) {
    Ok(v) => v,
    Err(e) => emit_error(ErrorOutput::new(format!("json parse: {}", e))),
  };

  let engine = Engine::with_defaults();
  let report = match engine.analyze(request).await {
    Ok(report) => report,
    Err(EngineError::Config { field, reason }) => {
      emit_error(ErrorOutput::new(reason).with_field(field))
    }
    Err(e) => emit_error(ErrorOutput::new(e.to_string())),
  };

  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  let _ = serde_json::to_writer(&mut out, &report);
  let _ = writeln!(out);
  let _ = out.flush();
}
