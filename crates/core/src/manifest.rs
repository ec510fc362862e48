//! Package manifest: the canonical, durable record of a built package.
//!
//! The manifest describes exactly what a package contains (artifact names
//! and parameters, tool hashes and sizes) and carries a fingerprint that
//! identifies the package by content. The fingerprint is computed over the
//! sorted artifact names and the sorted (tool, hash) pairs, so two builds of
//! the same request with the same resolved tools agree byte-for-byte on
//! everything except the creation timestamp, which is deliberately excluded
//! from the fingerprint.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::Parameter;
use crate::{Error, Result};

/// Current manifest format version.
pub const FORMAT_VERSION: u32 = 1;

/// Filename of the manifest inside a package directory.
pub const MANIFEST_NAME: &str = "manifest.json";

/// An artifact entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestArtifact {
    /// Artifact name.
    pub name: String,
    /// Parameters applied, verbatim from the definition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

/// A tool entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestTool {
    /// Tool identifier.
    pub name: String,
    /// Verified SHA-256 content hash.
    pub hash: String,
    /// Byte size of the binary.
    pub size: u64,
    /// Path of the binary relative to the package root.
    pub path: String,
}

/// The package manifest, serialized as `manifest.json` in the package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Deterministic content fingerprint.
    pub fingerprint: String,
    /// Creation timestamp. Excluded from the fingerprint.
    pub created: DateTime<Utc>,
    /// Included artifacts, sorted by name.
    pub artifacts: Vec<ManifestArtifact>,
    /// Included tools, sorted by identifier.
    pub tools: Vec<ManifestTool>,
    /// Total byte size of all included tools.
    pub total_size: u64,
    /// Manifest format version.
    pub format_version: u32,
}

impl PackageManifest {
    /// Recompute the fingerprint from this manifest's own contents.
    ///
    /// Matches [`compute_fingerprint`] over the manifest's artifact and tool
    /// lists; used to check round-trip integrity of a built package.
    #[must_use]
    pub fn recompute_fingerprint(&self) -> String {
        compute_fingerprint(
            self.artifacts.iter().map(|a| a.name.as_str()),
            self.tools.iter().map(|t| (t.name.as_str(), t.hash.as_str())),
        )
    }

    /// Serialize to canonical pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a manifest from a file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, malformed, or declares a format version
    /// newer than this build understands.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        if manifest.format_version > FORMAT_VERSION {
            return Err(Error::validation(format!(
                "manifest format version {} is newer than supported version {}",
                manifest.format_version, FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Save the manifest to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Compute a package fingerprint over artifact names and (tool, hash) pairs.
///
/// Inputs are sorted internally, so callers may pass them in any order. The
/// creation timestamp never participates.
#[must_use]
pub fn compute_fingerprint<'a>(
    artifact_names: impl Iterator<Item = &'a str>,
    tools: impl Iterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut names: Vec<&str> = artifact_names.collect();
    names.sort_unstable();
    let mut pairs: Vec<(&str, &str)> = tools.collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(b"artifact:");
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    for (tool, hash) in pairs {
        hasher.update(b"tool:");
        hasher.update(tool.as_bytes());
        hasher.update(b":");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
