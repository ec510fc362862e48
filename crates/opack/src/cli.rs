//! Command-line interface definition and exit-code mapping.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Diagnostic;
use thiserror::Error;

use opack_core::Error as CoreError;
use opack_fetcher::FetchMode;

/// Successful exit.
pub const EXIT_OK: u8 = 0;
/// CLI or configuration error.
pub const EXIT_CLI: u8 = 2;
/// Hard build failure: parse, conflict, unknown artifact, fetch abort, or
/// integrity violation.
pub const EXIT_BUILD: u8 = 3;
/// Partial success: best-effort build completed with failed tools.
pub const EXIT_PARTIAL: u8 = 4;

/// Build verified offline collection packages from artifact definitions.
#[derive(Debug, Parser)]
#[command(name = "opack", version, about)]
pub struct Cli {
    /// Log verbosity.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Log level options for the CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Show all logs.
    Trace,
    /// Show debug and above.
    Debug,
    /// Show info and above.
    Info,
    /// Show warnings and above (default).
    Warn,
    /// Show errors only.
    Error,
}

impl LogLevel {
    /// The tracing filter directive for this level.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Batch failure policy flag.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Abort the whole build on the first unrecoverable tool failure.
    FailFast,
    /// Fetch what succeeds and report what fails.
    BestEffort,
}

impl From<ModeArg> for FetchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::FailFast => Self::FailFast,
            ModeArg::BestEffort => Self::BestEffort,
        }
    }
}

/// opack subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a package from a set of artifact definitions.
    Build {
        /// Directory holding artifact definition YAML files.
        #[arg(long)]
        definitions: PathBuf,
        /// Output directory for the assembled package.
        #[arg(long)]
        output: PathBuf,
        /// Batch failure policy.
        #[arg(long, value_enum, default_value_t = ModeArg::FailFast)]
        mode: ModeArg,
        /// Tool cache directory (defaults to the platform cache dir).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Concurrent download limit.
        #[arg(long, default_value_t = opack_fetcher::DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Download attempts per tool.
        #[arg(long, default_value_t = opack_fetcher::DEFAULT_ATTEMPTS)]
        attempts: u32,
        /// Artifact names to include.
        #[arg(required = true)]
        artifacts: Vec<String>,
    },
    /// Resolve and print the tool set for a request without fetching.
    Resolve {
        /// Directory holding artifact definition YAML files.
        #[arg(long)]
        definitions: PathBuf,
        /// Artifact names to resolve.
        #[arg(required = true)]
        artifacts: Vec<String>,
    },
    /// Verify a built package against its manifest.
    Verify {
        /// Package directory.
        package: PathBuf,
    },
    /// Inspect or maintain the tool cache.
    Cache {
        /// Cache operation.
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Cache maintenance operations.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Print cached tool count and total size.
    Status {
        /// Tool cache directory (defaults to the platform cache dir).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Remove all cached tools.
    Clear {
        /// Tool cache directory (defaults to the platform cache dir).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// CLI-facing error with diagnostic help, mapped onto an exit code.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    /// Configuration problem: bad paths, unreadable definitions directory.
    #[error("{message}")]
    #[diagnostic(code(opack::cli::config))]
    Config {
        /// The error message.
        message: String,
        /// Optional help text.
        #[help]
        help: Option<String>,
    },
    /// Hard build failure from the engine.
    #[error(transparent)]
    #[diagnostic(code(opack::cli::build))]
    Build(#[from] CoreError),
}

impl CliError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text.
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// The exit code this error maps to.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } => EXIT_CLI,
            Self::Build(_) => EXIT_BUILD,
        }
    }

    /// Investigation hint for the underlying failure, if one applies.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Build(CoreError::HashMismatch { .. }) => Some(
                "the source may be stale or compromised; verify the mirror and the declared expected_hash before retrying",
            ),
            Self::Build(CoreError::Conflict { .. }) => Some(
                "align the conflicting tool declarations on one url and expected_hash",
            ),
            _ => None,
        }
    }
}
