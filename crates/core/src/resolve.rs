//! Tool index and dependency resolution.
//!
//! The index aggregates every [`ToolReference`] declared across the parsed
//! definition set, keyed by tool identifier. Resolution is a single-hop
//! union: artifacts reference tools, and never other artifacts, so resolving
//! a request is a lookup per requested name followed by a deduplicating
//! merge. That shape is deliberate and load-bearing: it bounds the fetch and
//! package scope to exactly the tools of the named artifacts.

use std::collections::BTreeMap;

use tracing::debug;

use crate::artifact::{ArtifactDefinition, ToolReference};
use crate::{Error, Result};

/// Registry mapping tool identifiers to their source metadata, built by
/// scanning all parsed artifacts.
#[derive(Debug, Default, Clone)]
pub struct ToolIndex {
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    tool: ToolReference,
    declared_by: String,
}

impl ToolIndex {
    /// Build the index from a definition set.
    ///
    /// A tool declared by several artifacts with identical url and hash is
    /// inserted once. Divergent duplicate declarations are a hard failure,
    /// not a merge decision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] naming both declaring artifacts when two
    /// declarations of the same identifier disagree on url or hash.
    pub fn build(definitions: &[ArtifactDefinition]) -> Result<Self> {
        let mut entries: BTreeMap<String, IndexEntry> = BTreeMap::new();
        for definition in definitions {
            for tool in &definition.tools {
                match entries.get(&tool.name) {
                    None => {
                        entries.insert(
                            tool.name.clone(),
                            IndexEntry {
                                tool: tool.clone(),
                                declared_by: definition.name.clone(),
                            },
                        );
                    }
                    Some(existing) => {
                        if existing.tool.url != tool.url
                            || existing.tool.expected_hash != tool.expected_hash
                        {
                            return Err(Error::conflict(
                                &tool.name,
                                &existing.declared_by,
                                &definition.name,
                            ));
                        }
                        // Identical redeclaration: no-op.
                    }
                }
            }
        }
        debug!(tools = entries.len(), "Built tool index");
        Ok(Self { entries })
    }

    /// Look up a tool by identifier.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolReference> {
        self.entries.get(name).map(|e| &e.tool)
    }

    /// The artifact that first declared a tool.
    #[must_use]
    pub fn declared_by(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.declared_by.as_str())
    }

    /// Number of distinct tools in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The deduplicated set of tools required to satisfy a requested artifact
/// set. Keyed by tool identifier; iteration order is deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedToolSet {
    tools: BTreeMap<String, ToolReference>,
}

impl ResolvedToolSet {
    /// Iterate tools in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolReference> {
        self.tools.values()
    }

    /// Look up a resolved tool by identifier.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolReference> {
        self.tools.get(name)
    }

    /// Number of distinct resolved tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn insert(&mut self, tool: ToolReference) {
        self.tools.entry(tool.name.clone()).or_insert(tool);
    }
}

impl FromIterator<ToolReference> for ResolvedToolSet {
    /// Collect tool references, deduplicating by identifier (first wins).
    fn from_iter<I: IntoIterator<Item = ToolReference>>(iter: I) -> Self {
        let mut set = Self::default();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ResolvedToolSet {
    type Item = &'a ToolReference;
    type IntoIter = std::collections::btree_map::Values<'a, String, ToolReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.values()
    }
}

/// The output of resolving a build request: the requested definitions in
/// request order plus their deduplicated tool set.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Requested artifacts, first-occurrence order preserved.
    pub artifacts: Vec<ArtifactDefinition>,
    /// Union of the artifacts' tool references.
    pub tools: ResolvedToolSet,
}

/// Resolves build requests against a parsed definition set.
///
/// Owns the definitions and their tool index; both are immutable after
/// construction. A fresh [`Resolution`] is produced per request.
#[derive(Debug)]
pub struct DependencyResolver {
    artifacts: BTreeMap<String, ArtifactDefinition>,
    index: ToolIndex,
}

impl DependencyResolver {
    /// Build a resolver over a definition set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if index construction finds divergent
    /// duplicate tool declarations, or [`Error::Parse`] on duplicate
    /// artifact names.
    pub fn new(definitions: Vec<ArtifactDefinition>) -> Result<Self> {
        let index = ToolIndex::build(&definitions)?;
        let mut artifacts = BTreeMap::new();
        for definition in definitions {
            if let Some(previous) =
                artifacts.insert(definition.name.clone(), definition)
            {
                return Err(Error::parse(
                    "name",
                    format!("duplicate artifact name '{}'", previous.name),
                ));
            }
        }
        Ok(Self { artifacts, index })
    }

    /// Look up a definition by name.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&ArtifactDefinition> {
        self.artifacts.get(name)
    }

    /// All known artifact names, sorted.
    #[must_use]
    pub fn artifact_names(&self) -> Vec<&str> {
        self.artifacts.keys().map(String::as_str).collect()
    }

    /// The tool index built over the definition set.
    #[must_use]
    pub fn index(&self) -> &ToolIndex {
        &self.index
    }

    /// Resolve a requested artifact list into its definitions and the
    /// deduplicated tool set they require.
    ///
    /// Duplicate request entries are collapsed to their first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownArtifact`] naming the first requested
    /// identifier not present in the definition set.
    pub fn resolve(&self, requested: &[String]) -> Result<Resolution> {
        let mut artifacts = Vec::with_capacity(requested.len());
        let mut seen = std::collections::BTreeSet::new();
        let mut tools = ResolvedToolSet::default();

        for name in requested {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let definition = self
                .artifacts
                .get(name)
                .ok_or_else(|| Error::UnknownArtifact(name.clone()))?;
            for tool in &definition.tools {
                tools.insert(tool.clone());
            }
            artifacts.push(definition.clone());
        }

        debug!(
            artifacts = artifacts.len(),
            tools = tools.len(),
            "Resolved build request"
        );
        Ok(Resolution { artifacts, tools })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::parse_artifact;

    const HASH_A: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
    const HASH_B: &str = "60303ae22b998861bce3b28f33eec1be758a213c86c93c076dbe9f558c11c752";

    fn artifact(name: &str, tools: &[(&str, &str, &str)]) -> ArtifactDefinition {
        let mut text = format!("name: {name}\ntype: CLIENT\nsources:\n  - query: SELECT 1\n");
        if !tools.is_empty() {
            text.push_str("tools:\n");
            for (tool, url, hash) in tools {
                text.push_str(&format!(
                    "  - name: {tool}\n    url: {url}\n    expected_hash: {hash}\n"
                ));
            }
        }
        parse_artifact(&text).unwrap()
    }

    #[test]
    fn test_index_deduplicates_identical_declarations() {
        let defs = vec![
            artifact("A", &[("t1", "https://example.com/t1", HASH_A)]),
            artifact("B", &[("t1", "https://example.com/t1", HASH_A)]),
        ];
        let index = ToolIndex::build(&defs).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.declared_by("t1"), Some("A"));
    }

    #[test]
    fn test_index_conflict_names_both_artifacts() {
        let defs = vec![
            artifact("First.Artifact", &[("t1", "https://example.com/t1", HASH_A)]),
            artifact("Second.Artifact", &[("t1", "https://example.com/t1", HASH_B)]),
        ];
        let err = ToolIndex::build(&defs).unwrap_err();
        match err {
            Error::Conflict { tool, first, second } => {
                assert_eq!(tool, "t1");
                assert_eq!(first, "First.Artifact");
                assert_eq!(second, "Second.Artifact");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_index_conflict_on_divergent_url() {
        let defs = vec![
            artifact("A", &[("t1", "https://example.com/t1", HASH_A)]),
            artifact("B", &[("t1", "https://mirror.example.com/t1", HASH_A)]),
        ];
        assert!(matches!(
            ToolIndex::build(&defs),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn test_resolution_unions_and_deduplicates() {
        // A: [T1], B: [T1, T2] -> request [A, B] resolves to {T1, T2}.
        let defs = vec![
            artifact("A", &[("T1", "https://example.com/t1", HASH_A)]),
            artifact(
                "B",
                &[
                    ("T1", "https://example.com/t1", HASH_A),
                    ("T2", "https://example.com/t2", HASH_B),
                ],
            ),
        ];
        let resolver = DependencyResolver::new(defs).unwrap();
        let resolution = resolver
            .resolve(&["A".to_string(), "B".to_string()])
            .unwrap();

        assert_eq!(resolution.tools.len(), 2);
        assert!(resolution.tools.get("T1").is_some());
        assert!(resolution.tools.get("T2").is_some());
        assert_eq!(resolution.artifacts.len(), 2);
    }

    #[test]
    fn test_resolution_preserves_request_order() {
        let defs = vec![artifact("A", &[]), artifact("B", &[]), artifact("C", &[])];
        let resolver = DependencyResolver::new(defs).unwrap();
        let resolution = resolver
            .resolve(&["C".to_string(), "A".to_string(), "C".to_string()])
            .unwrap();
        let names: Vec<_> = resolution.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["C", "A"]);
    }

    #[test]
    fn test_unknown_artifact_named_in_error() {
        let resolver = DependencyResolver::new(vec![artifact("A", &[])]).unwrap();
        let err = resolver.resolve(&["C".to_string()]).unwrap_err();
        match err {
            Error::UnknownArtifact(name) => assert_eq!(name, "C"),
            other => panic!("expected unknown artifact, got {other:?}"),
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let defs = vec![
            artifact(
                "A",
                &[
                    ("zeta", "https://example.com/z", HASH_A),
                    ("alpha", "https://example.com/a", HASH_B),
                ],
            ),
            artifact("B", &[("alpha", "https://example.com/a", HASH_B)]),
        ];
        let resolver = DependencyResolver::new(defs).unwrap();
        let request = vec!["B".to_string(), "A".to_string()];

        let first = resolver.resolve(&request).unwrap();
        let second = resolver.resolve(&request).unwrap();
        assert_eq!(first.tools, second.tools);

        // BTreeMap keying: iteration is identifier-sorted.
        let order: Vec<_> = first.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, ["alpha", "zeta"]);
    }
}
