//! The build command: parse, resolve, fetch, assemble.

use std::path::PathBuf;

use tracing::{info, warn};

use opack_cache::{ToolCache, default_cache_dir};
use opack_core::manifest::MANIFEST_NAME;
use opack_core::resolve::DependencyResolver;
use opack_fetcher::{FetchOptions, HttpDownloader, ToolFetcher};
use opack_packager::{PackageBuilder, prune_incomplete};

use crate::cli::{CliError, EXIT_OK, EXIT_PARTIAL, ModeArg};

/// Arguments for a build invocation.
pub struct BuildArgs {
    /// Directory of artifact definition files.
    pub definitions: PathBuf,
    /// Package output directory.
    pub output: PathBuf,
    /// Batch failure policy.
    pub mode: ModeArg,
    /// Tool cache override.
    pub cache_dir: Option<PathBuf>,
    /// Concurrent download limit.
    pub concurrency: usize,
    /// Download attempts per tool.
    pub attempts: u32,
    /// Requested artifact names.
    pub artifacts: Vec<String>,
}

/// Run a build. Prints the manifest path on success; failed tool
/// identifiers are reported one per line on stderr.
pub async fn run(args: BuildArgs) -> Result<u8, CliError> {
    if !args.definitions.is_dir() {
        return Err(CliError::config_with_help(
            format!(
                "definitions directory not found: {}",
                args.definitions.display()
            ),
            "pass --definitions pointing at a directory of artifact YAML files",
        ));
    }

    let definitions = opack_core::artifact::load_dir(&args.definitions)?;
    info!(count = definitions.len(), "Loaded artifact definitions");

    let resolver = DependencyResolver::new(definitions)?;
    let resolution = resolver.resolve(&args.artifacts)?;
    info!(
        artifacts = resolution.artifacts.len(),
        tools = resolution.tools.len(),
        "Resolved build request"
    );

    let cache = ToolCache::new(args.cache_dir.unwrap_or_else(default_cache_dir));
    let options = FetchOptions {
        concurrency: args.concurrency,
        attempts: args.attempts,
        mode: args.mode.into(),
        ..FetchOptions::default()
    };
    let fetcher = ToolFetcher::with_options(HttpDownloader::new(), options);
    let report = fetcher.fetch_all(&resolution.tools, &cache).await?;

    let (final_resolution, partial) = if report.is_complete() {
        (resolution, false)
    } else {
        // Best-effort: ship only the artifacts whose tools all arrived.
        (prune_incomplete(&resolution, &report.fetched), true)
    };

    let package = PackageBuilder::new(&args.output).build(&final_resolution, &report.fetched)?;
    println!("{}", package.root.join(MANIFEST_NAME).display());

    if partial {
        warn!(
            failed = report.failed.len(),
            "Build completed partially"
        );
        for failure in &report.failed {
            eprintln!("failed: {}: {}", failure.identifier, failure.error);
        }
        return Ok(EXIT_PARTIAL);
    }
    Ok(EXIT_OK)
}
