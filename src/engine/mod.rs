//! The execution engine: dependency-ordered dispatch, per-spec worker
//! pipeline, and the coordinating orchestrator loop.

pub mod dispatch;
pub mod orchestrator;
pub mod worker;

pub use orchestrator::{Engine, RunOptions, RunSummary};
