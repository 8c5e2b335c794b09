//! Cascade Engine — deterministic log correlation + cascade-failure detection.
//!
//! Ingests a closed batch of heterogeneous log sources, clusters repeated
//! error patterns by masked signature, flags anomalous clusters against a
//! rate baseline, and reconstructs causal incident chains with a ranked
//! root-cause candidate. The narrative step is an external collaborator:
//! the engine emits a structured report and can attach returned prose, but
//! never depends on it.
//!
//! No AI, no DB, no network; pure computation per run, no cross-run state.

pub mod anomaly;
pub mod cascade;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod normalize;
pub mod signature;
pub mod timeline;
pub mod types;

pub use config::RunConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use types::{AnalysisReport, AnalysisRequest, LogSource};
