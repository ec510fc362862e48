//! Property tests for resolution and fingerprint determinism.

use opack_core::artifact::parse_artifact;
use opack_core::manifest::compute_fingerprint;
use opack_core::resolve::DependencyResolver;
use proptest::prelude::*;

fn definition(name: &str, tools: &[(String, String)]) -> opack_core::ArtifactDefinition {
    let mut text = format!("name: {name}\ntype: CLIENT\nsources:\n  - query: SELECT 1\n");
    if !tools.is_empty() {
        text.push_str("tools:\n");
        for (tool, hash) in tools {
            text.push_str(&format!(
                "  - name: {tool}\n    url: https://example.com/{tool}\n    expected_hash: {hash}\n"
            ));
        }
    }
    parse_artifact(&text).expect("generated definition must parse")
}

prop_compose! {
    fn arb_hash()(bytes in proptest::array::uniform32(any::<u8>())) -> String {
        hex::encode(bytes)
    }
}

prop_compose! {
    fn arb_tool_name()(s in "[a-z][a-z0-9_]{0,12}") -> String { s }
}

proptest! {
    #[test]
    fn fingerprint_is_order_independent(
        mut names in proptest::collection::vec("[A-Z][A-Za-z0-9.]{0,16}", 1..8),
        mut tools in proptest::collection::vec((arb_tool_name(), arb_hash()), 0..8),
    ) {
        names.sort();
        names.dedup();
        tools.sort();
        tools.dedup_by(|a, b| a.0 == b.0);

        let forward = compute_fingerprint(
            names.iter().map(String::as_str),
            tools.iter().map(|(t, h)| (t.as_str(), h.as_str())),
        );
        let reversed = compute_fingerprint(
            names.iter().rev().map(String::as_str),
            tools.iter().rev().map(|(t, h)| (t.as_str(), h.as_str())),
        );
        prop_assert_eq!(forward, reversed);
    }

    #[test]
    fn resolution_is_stable_across_calls(
        tools in proptest::collection::vec((arb_tool_name(), arb_hash()), 0..6),
    ) {
        let mut tools = tools;
        tools.sort();
        tools.dedup_by(|a, b| a.0 == b.0);

        // Two artifacts sharing the full tool list: the union must contain
        // each tool once, and repeated resolution must agree exactly.
        let defs = vec![
            definition("Prop.A", &tools),
            definition("Prop.B", &tools),
        ];
        let resolver = DependencyResolver::new(defs).expect("no conflicts by construction");
        let request = vec!["Prop.A".to_string(), "Prop.B".to_string()];

        let first = resolver.resolve(&request).expect("resolution succeeds");
        let second = resolver.resolve(&request).expect("resolution succeeds");

        prop_assert_eq!(first.tools.len(), tools.len());
        prop_assert_eq!(&first.tools, &second.tools);
    }
}
