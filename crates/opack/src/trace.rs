//! Tracing configuration for the opack CLI.
//!
//! Logs go to stderr so stdout stays machine-consumable (manifest paths,
//! resolution listings). `RUST_LOG` overrides the `--log-level` flag.

use std::io;

use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

/// Initialize the global subscriber.
pub fn init_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_filter();
        EnvFilter::new(format!(
            "opack={level},opack_core={level},opack_cache={level},opack_fetcher={level},opack_packager={level}"
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(false),
            )
            .init();
    }
}
