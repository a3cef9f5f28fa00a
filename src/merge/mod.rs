pub mod executor;

pub use executor::{run, MergeOptions, MergeSummary};
