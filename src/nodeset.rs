//! Node-set resolver (C4): turns `--nodes`, cluster-enumerated nodes, and
//! `--no-local` into the final, deduplicated list of addresses to collect from.
//!
//! Grounded in the original's `get_nodes_from_regex`/`parse_node_strings` pair: the
//! `--nodes` value is first split on commas that do not sit inside a regex pattern
//! (so `web0[1-3],db01` splits, but `web0[1,2,3]` as a single group would not — the
//! real tool's heuristic is "split on commas outside of brackets" which we mirror
//! in [`tokenize`]).

use std::collections::HashSet;

use regex::Regex;

use crate::util::glob_to_anchored_regex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Pattern(String),
}

/// Splits a raw `--nodes` argument on top-level commas, i.e. commas that are not
/// nested inside `[...]` (spec §4.4 step 1). A token containing any of `*?[]` is
/// classified as a pattern; everything else is a literal hostname.
fn tokenize(raw: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();

    for c in raw.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth <= 0 => {
                push_token(&mut tokens, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_token(&mut tokens, &current);
    tokens
}

fn push_token(tokens: &mut Vec<Token>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    if trimmed.contains(['*', '?', '[']) {
        tokens.push(Token::Pattern(trimmed.to_string()));
    } else {
        tokens.push(Token::Literal(trimmed.to_string()));
    }
}

/// Resolves the final node list (spec §4.4): tokenizes `--nodes`, expands literal
/// entries verbatim, matches pattern entries against `cluster_nodes` (the set the
/// active cluster profile enumerated, empty when profile is `none`), unions with
/// the cluster's own literal list, strips `no_local` names when requested, and
/// dedupes case-sensitively while preserving first-seen order.
///
/// `local_identities` is every name/address `--no-local` should strip: the
/// driver's short hostname, its FQDN, and every local IP address, plus the
/// `"localhost"` literal — not just one hostname string (spec §3, §4.4 step 6).
pub fn resolve(
    raw_nodes: &[String],
    cluster_nodes: &[String],
    local_identities: &HashSet<String>,
    no_local: bool,
) -> Result<Vec<String>, regex::Error> {
    let mut resolved: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |name: &str, resolved: &mut Vec<String>, seen: &mut HashSet<String>| {
        if seen.insert(name.to_string()) {
            resolved.push(name.to_string());
        }
    };

    for raw in raw_nodes {
        for token in tokenize(raw) {
            match token {
                Token::Literal(name) => push(&name, &mut resolved, &mut seen),
                Token::Pattern(glob) => {
                    let anchored = glob_to_anchored_regex(&glob);
                    let re = Regex::new(&anchored)?;
                    for candidate in cluster_nodes {
                        if re.is_match(candidate) {
                            push(candidate, &mut resolved, &mut seen);
                        }
                    }
                }
            }
        }
    }

    if raw_nodes.is_empty() {
        for candidate in cluster_nodes {
            push(candidate, &mut resolved, &mut seen);
        }
    }

    if no_local {
        resolved.retain(|n| n != "localhost" && !local_identities.contains(n));
    }

    Ok(resolved)
}

/// The column width the UI layer pads hostnames to when printing per-node status
/// lines (spec §4.4: "computed once the node list is final").
pub fn hostname_field_width(nodes: &[String]) -> usize {
    nodes.iter().map(|n| n.len()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_top_level_commas_only() {
        let tokens = tokenize("web01,web02,db[0-9]");
        assert_eq!(
            tokens,
            vec![
                Token::Literal("web01".into()),
                Token::Literal("web02".into()),
                Token::Pattern("db[0-9]".into()),
            ]
        );
    }

    #[test]
    fn tokenize_does_not_split_commas_inside_brackets() {
        let tokens = tokenize("web[01,02,03]");
        assert_eq!(tokens, vec![Token::Pattern("web[01,02,03]".into())]);
    }

    #[test]
    fn pattern_tokens_expand_against_cluster_nodes() {
        let cluster_nodes = vec![
            "web01.example".to_string(),
            "web02.example".to_string(),
            "db01.example".to_string(),
        ];
        let nodes = vec!["web*".to_string()];
        let resolved = resolve(&nodes, &cluster_nodes, &HashSet::new(), false).unwrap();
        assert_eq!(resolved, vec!["web01.example", "web02.example"]);
    }

    #[test]
    fn literal_and_pattern_entries_combine_and_dedupe() {
        let cluster_nodes = vec!["web01.example".to_string(), "web02.example".to_string()];
        let nodes = vec!["web01.example,web*".to_string()];
        let resolved = resolve(&nodes, &cluster_nodes, &HashSet::new(), false).unwrap();
        assert_eq!(resolved, vec!["web01.example", "web02.example"]);
    }

    #[test]
    fn no_local_strips_localhost_and_primary_hostname() {
        let cluster_nodes = vec!["localhost".to_string(), "other.example".to_string()];
        let nodes = vec!["localhost,other.example,primary.example".to_string()];
        let local_identities: HashSet<String> = ["primary.example".to_string()].into_iter().collect();
        let resolved = resolve(&nodes, &cluster_nodes, &local_identities, true).unwrap();
        assert_eq!(resolved, vec!["other.example"]);
    }

    #[test]
    fn no_local_strips_every_local_identity_not_just_one() {
        let cluster_nodes = vec!["short".to_string(), "fqdn.example".to_string(), "10.0.0.5".to_string(), "other.example".to_string()];
        let nodes = vec!["short,fqdn.example,10.0.0.5,other.example".to_string()];
        let local_identities: HashSet<String> = ["short".to_string(), "fqdn.example".to_string(), "10.0.0.5".to_string()]
            .into_iter()
            .collect();
        let resolved = resolve(&nodes, &cluster_nodes, &local_identities, true).unwrap();
        assert_eq!(resolved, vec!["other.example"]);
    }

    #[test]
    fn empty_raw_nodes_falls_back_to_cluster_enumeration() {
        let cluster_nodes = vec!["a.example".to_string(), "b.example".to_string()];
        let resolved = resolve(&[], &cluster_nodes, &HashSet::new(), false).unwrap();
        assert_eq!(resolved, cluster_nodes);
    }

    #[test]
    fn hostname_field_width_tracks_longest_name() {
        let nodes = vec!["a".to_string(), "bbbbb".to_string(), "cc".to_string()];
        assert_eq!(hostname_field_width(&nodes), 5);
    }
}
