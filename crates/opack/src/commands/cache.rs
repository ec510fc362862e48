//! Cache maintenance commands.

use opack_cache::{ToolCache, default_cache_dir};

use crate::cli::{CacheAction, CliError, EXIT_OK};

/// Run a cache maintenance action.
pub fn run(action: CacheAction) -> Result<u8, CliError> {
    match action {
        CacheAction::Status { cache_dir } => {
            let cache = ToolCache::new(cache_dir.unwrap_or_else(default_cache_dir));
            let entries = cache.entries().map_err(CliError::Build)?;
            let total: u64 = entries.iter().map(|(_, _, size)| size).sum();
            println!("{} tool(s), {} bytes ({})", entries.len(), total, cache.root().display());
            for (identifier, hash, size) in entries {
                println!("{identifier}  {hash}  {size}");
            }
            Ok(EXIT_OK)
        }
        CacheAction::Clear { cache_dir } => {
            let cache = ToolCache::new(cache_dir.unwrap_or_else(default_cache_dir));
            cache.clear().map_err(CliError::Build)?;
            println!("cleared {}", cache.root().display());
            Ok(EXIT_OK)
        }
    }
}
