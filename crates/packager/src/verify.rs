//! Round-trip package verification.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use opack_core::artifact::parse_artifact;
use opack_core::hash::sha256_hex;
use opack_core::manifest::{MANIFEST_NAME, PackageManifest};
use opack_core::{Error, Result};

use crate::builder::{ARTIFACTS_DIR, TOOLS_DIR};

/// Verify a built package against its own manifest.
///
/// Recomputes the fingerprint from the manifest's contents, re-hashes every
/// tool binary, reparses every artifact definition, and checks that the
/// package holds exactly the files the manifest claims: no extra, no
/// missing. Returns the verified manifest.
///
/// # Errors
///
/// Returns [`Error::PackageIntegrity`] describing the first discrepancy.
pub fn verify_package(root: &Path) -> Result<PackageManifest> {
    let manifest = PackageManifest::load(&root.join(MANIFEST_NAME))?;

    let recomputed = manifest.recompute_fingerprint();
    if recomputed != manifest.fingerprint {
        return Err(Error::package_integrity(format!(
            "fingerprint mismatch: manifest records {}, contents hash to {}",
            manifest.fingerprint, recomputed
        )));
    }

    let mut total_size = 0u64;
    for tool in &manifest.tools {
        let path = root.join(&tool.path);
        let bytes = std::fs::read(&path).map_err(|e| {
            Error::package_integrity(format!(
                "tool '{}' missing from package ({}): {e}",
                tool.name,
                path.display()
            ))
        })?;
        let actual = sha256_hex(&bytes);
        if actual != tool.hash {
            return Err(Error::package_integrity(format!(
                "tool '{}' content hash {} does not match manifest hash {}",
                tool.name, actual, tool.hash
            )));
        }
        if bytes.len() as u64 != tool.size {
            return Err(Error::package_integrity(format!(
                "tool '{}' is {} bytes, manifest records {}",
                tool.name,
                bytes.len(),
                tool.size
            )));
        }
        total_size += tool.size;
        debug!(tool = %tool.name, "Verified tool binary");
    }

    if total_size != manifest.total_size {
        return Err(Error::package_integrity(format!(
            "total size {} does not match manifest total {}",
            total_size, manifest.total_size
        )));
    }

    for artifact in &manifest.artifacts {
        let path = root.join(ARTIFACTS_DIR).join(format!("{}.yaml", artifact.name));
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::package_integrity(format!(
                "artifact '{}' missing from package ({}): {e}",
                artifact.name,
                path.display()
            ))
        })?;
        let definition = parse_artifact(&text).map_err(|e| {
            Error::package_integrity(format!(
                "artifact '{}' no longer parses: {e}",
                artifact.name
            ))
        })?;
        if definition.name != artifact.name {
            return Err(Error::package_integrity(format!(
                "artifact file '{}' declares name '{}'",
                artifact.name, definition.name
            )));
        }
    }

    // The manifest must cover the package exactly: unlisted files under
    // tools/ or artifacts/ are as much a defect as missing ones.
    let expected_tools: BTreeSet<String> =
        manifest.tools.iter().map(|t| t.name.clone()).collect();
    check_no_extras(&root.join(TOOLS_DIR), &expected_tools, "tool")?;

    let expected_artifacts: BTreeSet<String> = manifest
        .artifacts
        .iter()
        .map(|a| format!("{}.yaml", a.name))
        .collect();
    check_no_extras(&root.join(ARTIFACTS_DIR), &expected_artifacts, "artifact")?;

    Ok(manifest)
}

fn check_no_extras(dir: &Path, expected: &BTreeSet<String>, kind: &str) -> Result<()> {
    if !dir.exists() {
        if expected.is_empty() {
            return Ok(());
        }
        return Err(Error::package_integrity(format!(
            "{kind} directory {} is missing",
            dir.display()
        )));
    }
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            Error::package_integrity(format!("cannot walk {}: {e}", dir.display()))
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !expected.contains(&name) {
            return Err(Error::package_integrity(format!(
                "unexpected {kind} file in package: {}",
                entry.path().display()
            )));
        }
    }
    Ok(())
}
