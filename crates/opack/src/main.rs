//! opack CLI entry point.
//!
//! Exit codes: 0 success, 2 CLI/configuration error, 3 hard build failure,
//! 4 partial success (best-effort build with failed tools). clap itself
//! exits 2 on usage errors, matching [`crate::cli::EXIT_CLI`].

// The binary is the one place that talks to stdout/stderr directly.
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;
mod commands;
mod trace;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Tracing may be unusable mid-panic; plain stderr is the reliable path.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("opack panicked: {panic_info}");
        eprintln!("run with --log-level debug for more information");
    }));

    let cli = Cli::parse();
    trace::init_tracing(cli.log_level, cli.json);

    match commands::run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            let code = error.exit_code();
            let hint = error.hint();
            eprintln!("{:?}", miette::Report::new(error));
            if let Some(hint) = hint {
                eprintln!("help: {hint}");
            }
            ExitCode::from(code)
        }
    }
}
