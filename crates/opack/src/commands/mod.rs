//! Command implementations.

mod build;
mod cache;
mod resolve;
mod verify;

use crate::cli::{CliError, Command};

/// Dispatch a parsed command, returning the exit code.
pub async fn run(command: Command) -> Result<u8, CliError> {
    match command {
        Command::Build {
            definitions,
            output,
            mode,
            cache_dir,
            concurrency,
            attempts,
            artifacts,
        } => {
            build::run(build::BuildArgs {
                definitions,
                output,
                mode,
                cache_dir,
                concurrency,
                attempts,
                artifacts,
            })
            .await
        }
        Command::Resolve {
            definitions,
            artifacts,
        } => resolve::run(&definitions, &artifacts),
        Command::Verify { package } => verify::run(&package),
        Command::Cache { action } => cache::run(action),
    }
}
