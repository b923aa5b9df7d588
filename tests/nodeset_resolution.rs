use std::collections::HashSet;

use sos_collector::nodeset;

#[test]
fn mixed_literal_and_glob_tokens_resolve_against_cluster_enumeration() {
    let cluster_nodes = vec![
        "web01.cluster.example".to_string(),
        "web02.cluster.example".to_string(),
        "web03.cluster.example".to_string(),
        "db01.cluster.example".to_string(),
    ];
    let raw_nodes = vec!["web0[1-2].cluster.example,db01.cluster.example".to_string()];

    // `[1-2]` is not a glob character set sos-collector supports for ranges, so this
    // exercises the literal/glob split boundary: `web0[1-2].cluster.example` is
    // classified as a pattern (it contains `[`), and only ends up matching nodes
    // whose name satisfies the single-character class `[1-2]` at that position.
    let resolved = nodeset::resolve(&raw_nodes, &cluster_nodes, &HashSet::new(), false).unwrap();

    assert!(resolved.contains(&"web01.cluster.example".to_string()));
    assert!(resolved.contains(&"web02.cluster.example".to_string()));
    assert!(resolved.contains(&"db01.cluster.example".to_string()));
    assert!(!resolved.contains(&"web03.cluster.example".to_string()));
}

#[test]
fn no_local_removes_primary_hostname_even_when_cluster_enumerated_it() {
    let cluster_nodes = vec![
        "primary.cluster.example".to_string(),
        "other.cluster.example".to_string(),
    ];
    let local_identities: HashSet<String> = ["primary.cluster.example".to_string()].into_iter().collect();
    let resolved = nodeset::resolve(&[], &cluster_nodes, &local_identities, true).unwrap();
    assert_eq!(resolved, vec!["other.cluster.example".to_string()]);
}

#[test]
fn duplicate_entries_across_literal_and_pattern_tokens_are_deduped() {
    let cluster_nodes = vec!["a.example".to_string(), "b.example".to_string()];
    let raw_nodes = vec!["a.example".to_string(), "*.example".to_string()];
    let resolved = nodeset::resolve(&raw_nodes, &cluster_nodes, &HashSet::new(), false).unwrap();
    assert_eq!(resolved, vec!["a.example".to_string(), "b.example".to_string()]);
}
