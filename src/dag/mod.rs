//! DAG definition model, parsing, and graph algorithms.

pub mod graph;
pub mod model;
pub mod parser;

pub use graph::{detect_cycles, ready_set, topological_sort};
pub use model::{Dag, Feature, Layer};
pub use parser::{derive_dag_id, load_dag_file, slugify};
