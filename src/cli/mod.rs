pub mod dispatch;
pub mod types;

pub use dispatch::{dispatch, CliError};
pub use types::{Cli, Commands};
