//! Core types and error handling for the opack engine.
//!
//! opack builds self-contained offline collection packages from declarative
//! artifact definitions. This crate holds the pieces every other crate in the
//! workspace builds on: the artifact data model and parser, the tool index and
//! dependency resolver, the package manifest, and the shared error taxonomy.

use thiserror::Error;

pub mod artifact;
pub mod hash;
pub mod manifest;
pub mod resolve;

pub use artifact::{
    ArtifactDefinition, ArtifactKind, Parameter, SourceBlock, ToolReference, load_dir,
    parse_artifact,
};
pub use manifest::{FORMAT_VERSION, MANIFEST_NAME, ManifestArtifact, ManifestTool, PackageManifest};
pub use resolve::{DependencyResolver, ResolvedToolSet, Resolution, ToolIndex};

/// Main error type for opack operations.
///
/// The taxonomy is closed on purpose: every failure a build can hit maps to
/// exactly one of these variants, and callers branch on the variant rather
/// than on message text.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed artifact definition. Fatal before any resolution happens.
    #[error("Invalid artifact definition ({field}): {message}")]
    Parse {
        /// The offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Two artifacts declare the same tool identifier with divergent
    /// URL or hash. Fatal at index-build time.
    #[error(
        "Conflicting declarations for tool '{tool}': artifacts '{first}' and '{second}' disagree on url or expected_hash"
    )]
    Conflict {
        /// The tool identifier declared twice.
        tool: String,
        /// The artifact that declared it first.
        first: String,
        /// The artifact whose declaration diverges.
        second: String,
    },

    /// A requested artifact identifier is not in the parsed set.
    #[error("Unknown artifact '{0}'")]
    UnknownArtifact(String),

    /// A download failed after exhausting its retry budget.
    #[error("Failed to download tool '{tool}' from {url} after {attempts} attempt(s): {message}")]
    Download {
        /// The tool identifier.
        tool: String,
        /// The source URL.
        url: String,
        /// How many attempts were made.
        attempts: u32,
        /// The final transport error.
        message: String,
    },

    /// Downloaded or cached content fails verification. Never retried.
    #[error(
        "Hash mismatch for tool '{tool}' from {url}: expected {expected}, got {actual}"
    )]
    HashMismatch {
        /// The tool identifier.
        tool: String,
        /// The source URL the content was fetched from.
        url: String,
        /// The declared expected hash.
        expected: String,
        /// The hash actually computed over the bytes.
        actual: String,
    },

    /// Internal invariant violation at assembly time. Always fatal.
    #[error("Package integrity violation: {0}")]
    PackageIntegrity(String),

    /// Generic validation failure outside the parse path.
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a parse error for a specific field.
    #[must_use]
    pub fn parse(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a conflict error naming both declaring artifacts.
    #[must_use]
    pub fn conflict(
        tool: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            tool: tool.into(),
            first: first.into(),
            second: second.into(),
        }
    }

    /// Create a download error.
    #[must_use]
    pub fn download(
        tool: impl Into<String>,
        url: impl Into<String>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Download {
            tool: tool.into(),
            url: url.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Create a hash mismatch error.
    #[must_use]
    pub fn hash_mismatch(
        tool: impl Into<String>,
        url: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::HashMismatch {
            tool: tool.into(),
            url: url.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a package integrity error.
    #[must_use]
    pub fn package_integrity(message: impl Into<String>) -> Self {
        Self::PackageIntegrity(message.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type alias for opack operations.
pub type Result<T> = std::result::Result<T, Error>;
