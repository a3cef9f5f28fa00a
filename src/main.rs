use clap::Parser;
use weft::cli::{dispatch, CliError, Cli};

fn main() {
    weft::utils::install_terminal_panic_hook();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(3);
        }
    };

    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(CliError::Validation(e)) => {
            eprintln!("error: {e}");
            3
        }
        Err(CliError::Runtime(e)) => {
            eprintln!("error: {e:?}");
            1
        }
    };

    std::process::exit(code);
}
