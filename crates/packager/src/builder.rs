//! The package builder: assembly, re-verification, manifest generation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info};

use opack_cache::CacheEntry;
use opack_core::artifact::ArtifactDefinition;
use opack_core::hash::sha256_hex;
use opack_core::manifest::{
    FORMAT_VERSION, MANIFEST_NAME, ManifestArtifact, ManifestTool, PackageManifest,
    compute_fingerprint,
};
use opack_core::resolve::{Resolution, ResolvedToolSet};
use opack_core::{Error, Result};

/// Package subdirectory holding artifact definitions.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Package subdirectory holding tool binaries.
pub const TOOLS_DIR: &str = "tools";

/// An assembled package. Immutable once built.
#[derive(Debug)]
pub struct Package {
    /// The package root directory.
    pub root: PathBuf,
    /// Included artifacts, in the order they were written (name-sorted).
    pub artifacts: Vec<ArtifactDefinition>,
    /// Tool identifier to the cache entry the binary was copied from.
    pub tools: BTreeMap<String, CacheEntry>,
    /// The generated manifest.
    pub manifest: PackageManifest,
}

/// Assembles packages from a resolution and its fetched cache entries.
#[derive(Debug)]
pub struct PackageBuilder {
    output: PathBuf,
}

impl PackageBuilder {
    /// Create a builder writing to `output`.
    #[must_use]
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    /// Assemble the package.
    ///
    /// Every tool in the resolution must be present in `fetched`; a missing
    /// entry means the fetcher contract was violated upstream and surfaces
    /// as [`Error::PackageIntegrity`] rather than being skipped. Cache
    /// entries are re-hashed as they are copied; a Verified entry is never
    /// trusted across builds.
    pub fn build(
        &self,
        resolution: &Resolution,
        fetched: &BTreeMap<String, CacheEntry>,
    ) -> Result<Package> {
        // Assembly-time invariant: the fetch join point guarantees
        // completeness, so a gap here is an internal error worth loud
        // failure.
        for tool in &resolution.tools {
            if !fetched.contains_key(&tool.name) {
                return Err(Error::package_integrity(format!(
                    "tool '{}' is missing from the fetched set at assembly time",
                    tool.name
                )));
            }
        }

        let artifacts_dir = self.output.join(ARTIFACTS_DIR);
        let tools_dir = self.output.join(TOOLS_DIR);
        std::fs::create_dir_all(&artifacts_dir)?;
        std::fs::create_dir_all(&tools_dir)?;

        // Definitions are written in stable name order, parameters verbatim.
        let mut artifacts = resolution.artifacts.clone();
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        for artifact in &artifacts {
            let path = artifacts_dir.join(format!("{}.yaml", artifact.name));
            std::fs::write(&path, artifact.to_yaml()?)?;
            debug!(artifact = %artifact.name, "Wrote artifact definition");
        }

        let mut tools = BTreeMap::new();
        let mut manifest_tools = Vec::new();
        let mut total_size = 0u64;
        for tool in &resolution.tools {
            let entry = &fetched[&tool.name];
            let bytes = std::fs::read(&entry.path)?;
            let actual = sha256_hex(&bytes);
            if actual != tool.expected_hash {
                return Err(Error::hash_mismatch(
                    &tool.name,
                    &tool.url,
                    &tool.expected_hash,
                    actual,
                ));
            }

            let dest = tools_dir.join(&tool.name);
            std::fs::write(&dest, &bytes)?;
            debug!(tool = %tool.name, hash = %actual, "Copied tool binary");

            total_size += bytes.len() as u64;
            manifest_tools.push(ManifestTool {
                name: tool.name.clone(),
                hash: actual,
                size: bytes.len() as u64,
                path: format!("{TOOLS_DIR}/{}", tool.name),
            });
            tools.insert(tool.name.clone(), entry.clone());
        }

        let manifest_artifacts: Vec<ManifestArtifact> = artifacts
            .iter()
            .map(|a| ManifestArtifact {
                name: a.name.clone(),
                parameters: a.parameters.clone(),
            })
            .collect();

        let fingerprint = compute_fingerprint(
            manifest_artifacts.iter().map(|a| a.name.as_str()),
            manifest_tools.iter().map(|t| (t.name.as_str(), t.hash.as_str())),
        );

        let manifest = PackageManifest {
            fingerprint,
            created: Utc::now(),
            artifacts: manifest_artifacts,
            tools: manifest_tools,
            total_size,
            format_version: FORMAT_VERSION,
        };
        manifest.save(&self.output.join(MANIFEST_NAME))?;

        info!(
            root = %self.output.display(),
            artifacts = artifacts.len(),
            tools = tools.len(),
            fingerprint = %manifest.fingerprint,
            "Package assembled"
        );

        Ok(Package {
            root: self.output.clone(),
            artifacts,
            tools,
            manifest,
        })
    }
}

/// Drop artifacts whose tools did not all fetch.
///
/// Best-effort builds use this between the fetch join point and assembly:
/// the returned resolution covers only artifacts with a complete tool set,
/// and its tool set is recomputed from the surviving artifacts so the
/// manifest matches exactly what ships.
#[must_use]
pub fn prune_incomplete(
    resolution: &Resolution,
    fetched: &BTreeMap<String, CacheEntry>,
) -> Resolution {
    let artifacts: Vec<ArtifactDefinition> = resolution
        .artifacts
        .iter()
        .filter(|artifact| {
            let complete = artifact
                .tools
                .iter()
                .all(|tool| fetched.contains_key(&tool.name));
            if !complete {
                debug!(artifact = %artifact.name, "Dropping artifact with failed tools");
            }
            complete
        })
        .cloned()
        .collect();

    let tools: ResolvedToolSet = artifacts
        .iter()
        .flat_map(|artifact| artifact.tools.iter().cloned())
        .collect();

    Resolution { artifacts, tools }
}
