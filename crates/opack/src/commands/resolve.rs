//! The resolve command: print the tool set a request would fetch.

use std::path::Path;

use opack_core::resolve::DependencyResolver;

use crate::cli::{CliError, EXIT_OK};

/// Resolve a request and print one `name  hash  url` line per tool.
pub fn run(definitions: &Path, artifacts: &[String]) -> Result<u8, CliError> {
    if !definitions.is_dir() {
        return Err(CliError::config_with_help(
            format!("definitions directory not found: {}", definitions.display()),
            "pass --definitions pointing at a directory of artifact YAML files",
        ));
    }

    let parsed = opack_core::artifact::load_dir(definitions)?;
    let resolver = DependencyResolver::new(parsed)?;
    let resolution = resolver.resolve(artifacts)?;

    for tool in &resolution.tools {
        println!("{}  {}  {}", tool.name, tool.expected_hash, tool.url);
    }
    Ok(EXIT_OK)
}
