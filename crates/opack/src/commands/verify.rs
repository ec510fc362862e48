//! The verify command: round-trip integrity check of a built package.

use std::path::Path;

use opack_packager::verify_package;

use crate::cli::{CliError, EXIT_OK};

/// Verify a package directory against its manifest and print the verified
/// fingerprint.
pub fn run(package: &Path) -> Result<u8, CliError> {
    if !package.is_dir() {
        return Err(CliError::config(format!(
            "package directory not found: {}",
            package.display()
        )));
    }

    let manifest = verify_package(package)?;
    println!(
        "verified {} ({} artifacts, {} tools, {} bytes)",
        manifest.fingerprint,
        manifest.artifacts.len(),
        manifest.tools.len(),
        manifest.total_size
    );
    Ok(EXIT_OK)
}
