//! Artifact definition model and parser.
//!
//! An artifact is a declarative description of a forensic data-collection
//! task. Definitions are YAML documents:
//!
//! ```yaml
//! name: Windows.Triage.Prefetch
//! description: Collect prefetch files
//! type: CLIENT
//! parameters:
//!   - name: uploadLimit
//!     type: int
//!     default: "100"
//! sources:
//!   - query: SELECT * FROM prefetch()
//! tools:
//!   - name: winpmem
//!     url: https://example.com/winpmem.exe
//!     expected_hash: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
//! ```
//!
//! Parsing is a pure function of the input text. Validation is strict: a tool
//! that cannot be verified (a URL without an expected hash) is a fatal
//! definition error, not a warning.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hash::normalize_digest;
use crate::{Error, Result};

/// The kind of an artifact: where the collection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactKind {
    /// Collected on an endpoint.
    Client,
    /// Collected on the server.
    Server,
    /// A streaming event artifact.
    Event,
}

impl ArtifactKind {
    /// Parse from the definition's `type` field.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLIENT" => Some(Self::Client),
            "SERVER" => Some(Self::Server),
            "EVENT" => Some(Self::Event),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "CLIENT"),
            Self::Server => write!(f, "SERVER"),
            Self::Event => write!(f, "EVENT"),
        }
    }
}

/// A declared artifact parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Declared type (free-form, e.g. "int", "string").
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// Default value, applied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A source query block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBlock {
    /// Optional source name (for multi-source artifacts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional precondition query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<String>,
    /// The collection query.
    pub query: String,
}

/// A reference to an external helper binary required by an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReference {
    /// Tool identifier, unique across the definition set.
    pub name: String,
    /// Source URL the binary is fetched from.
    pub url: String,
    /// Expected SHA-256 content hash (64 lowercase hex chars).
    pub expected_hash: String,
    /// Declared byte size, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A parsed, validated artifact definition. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDefinition {
    /// Unique artifact name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Artifact kind.
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    /// Declared parameters, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    /// Source query blocks, in declaration order.
    pub sources: Vec<SourceBlock>,
    /// Required helper tools, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolReference>,
}

impl ArtifactDefinition {
    /// Serialize the definition back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::parse("document", format!("failed to serialize: {e}")))
    }
}

/// Raw deserialization target. Everything is optional here so that missing
/// required fields surface as field-level parse errors instead of opaque
/// serde messages.
#[derive(Debug, Deserialize)]
struct RawArtifact {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default)]
    sources: Vec<SourceBlock>,
    #[serde(default)]
    tools: Vec<RawTool>,
}

#[derive(Debug, Deserialize)]
struct RawTool {
    name: Option<String>,
    url: Option<String>,
    expected_hash: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

/// Parse a single artifact definition document.
///
/// Pure function of the input text: no filesystem or network access.
///
/// # Errors
///
/// Returns [`Error::Parse`] naming the offending field when the document is
/// malformed or fails validation.
pub fn parse_artifact(text: &str) -> Result<ArtifactDefinition> {
    let raw: RawArtifact = serde_yaml::from_str(text)
        .map_err(|e| Error::parse("document", e.to_string()))?;

    let name = match raw.name {
        Some(n) if !n.trim().is_empty() => n,
        _ => return Err(Error::parse("name", "missing or empty")),
    };

    let kind = match raw.kind {
        None => return Err(Error::parse("type", format!("missing in artifact '{name}'"))),
        Some(k) => ArtifactKind::parse(&k).ok_or_else(|| {
            Error::parse(
                "type",
                format!("'{k}' is not one of CLIENT, SERVER, EVENT in artifact '{name}'"),
            )
        })?,
    };

    if raw.sources.is_empty() {
        return Err(Error::parse(
            "sources",
            format!("artifact '{name}' declares no sources"),
        ));
    }

    let mut tools = Vec::with_capacity(raw.tools.len());
    for tool in raw.tools {
        tools.push(validate_tool(&name, tool)?);
    }

    Ok(ArtifactDefinition {
        name,
        description: raw.description,
        kind,
        parameters: raw.parameters,
        sources: raw.sources,
        tools,
    })
}

fn validate_tool(artifact: &str, raw: RawTool) -> Result<ToolReference> {
    let name = match raw.name {
        Some(n) if !n.trim().is_empty() => n,
        _ => {
            return Err(Error::parse(
                "tools",
                format!("artifact '{artifact}' declares a tool without a name"),
            ));
        }
    };

    let url = match raw.url {
        Some(u) if !u.trim().is_empty() => u,
        _ => {
            return Err(Error::parse(
                "tools",
                format!("tool '{name}' in artifact '{artifact}' declares no url"),
            ));
        }
    };

    // An unverifiable tool is a fatal definition error, not a warning.
    let expected_hash = match raw.expected_hash {
        Some(h) => normalize_digest(&h).map_err(|e| {
            Error::parse(
                "tools",
                format!("tool '{name}' in artifact '{artifact}': {e}"),
            )
        })?,
        None => {
            return Err(Error::parse(
                "tools",
                format!(
                    "tool '{name}' in artifact '{artifact}' declares a url but no expected_hash"
                ),
            ));
        }
    };

    Ok(ToolReference {
        name,
        url,
        expected_hash,
        size: raw.size,
    })
}

/// Load and parse every artifact definition in a directory.
///
/// Files ending in `.yaml` or `.yml` are parsed in sorted filename order so
/// the returned set is deterministic. Duplicate artifact names across files
/// are rejected.
///
/// # Errors
///
/// Returns [`Error::Parse`] (with the file path folded into the message) for
/// the first invalid definition, or [`Error::Io`] if the directory cannot be
/// read.
pub fn load_dir(dir: &Path) -> Result<Vec<ArtifactDefinition>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if path.is_file() && is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    let mut seen: BTreeMap<String, std::path::PathBuf> = BTreeMap::new();
    let mut definitions = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let definition = parse_artifact(&text).map_err(|e| match e {
            Error::Parse { field, message } => {
                Error::parse(field, format!("{}: {message}", path.display()))
            }
            other => other,
        })?;

        if let Some(previous) = seen.get(&definition.name) {
            return Err(Error::parse(
                "name",
                format!(
                    "duplicate artifact name '{}' in {} (first declared in {})",
                    definition.name,
                    path.display(),
                    previous.display()
                ),
            ));
        }
        seen.insert(definition.name.clone(), path.clone());
        debug!(artifact = %definition.name, path = %path.display(), "Parsed artifact definition");
        definitions.push(definition);
    }

    Ok(definitions)
}
