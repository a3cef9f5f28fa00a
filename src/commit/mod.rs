pub mod verifier;

pub use verifier::{post_execution_commit_flow, CommitOutcome};
