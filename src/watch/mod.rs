//! Read-only watch/log-tail subsystem (§4.6). Consumes state and log files
//! written by the engine; never mutates either.

pub mod tailer;
pub mod watcher;

pub use tailer::LogTailer;
pub use watcher::{render_table, watch};
