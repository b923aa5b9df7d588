//! Cluster-profile registry (C2) and the cluster-profile strategy contract (C3).
//!
//! Authoring new cluster profiles is out of scope (spec §1); what's specified here
//! is the contract new profiles plug into and the registry/layering machinery that
//! selects among them. Per Design Note §9 ("Strategy objects without inheritance"),
//! profiles are a capability set behind a trait object, and layering is expressed
//! with an explicit `parent` name rather than a class hierarchy.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::node::NodeSession;
use crate::prelude::*;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown cluster type: {0}")]
    UnknownClusterType(String),

    #[error("unknown cluster option: {cluster}.{name}")]
    UnknownOption { cluster: String, name: String },

    #[error("invalid value for {cluster}.{name}: expected {expected}, got {value:?}")]
    InvalidOptionValue {
        cluster: String,
        name: String,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    String,
    Bool,
    Integer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Bool(bool),
    Integer(i64),
}

impl OptionValue {
    fn option_type(&self) -> OptionType {
        match self {
            OptionValue::String(_) => OptionType::String,
            OptionValue::Bool(_) => OptionType::Bool,
            OptionValue::Integer(_) => OptionType::Integer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeclaredOption {
    pub name: &'static str,
    pub default: OptionValue,
    pub description: &'static str,
}

/// The strategy contract a cluster profile implements (spec §4.3). `applies_here`
/// must be pure with respect to the primary node session already assigned to the
/// profile (spec §3 invariant); the registry enforces that by only ever calling it
/// with the run's one primary session.
#[async_trait]
pub trait ClusterProfileKind: Send + Sync {
    fn short_name(&self) -> &'static str;
    fn human_name(&self) -> &'static str;
    fn parent(&self) -> Option<&'static str> {
        None
    }
    fn declared_options(&self) -> Vec<DeclaredOption> {
        Vec::new()
    }

    async fn applies_here(&self, primary: &mut NodeSession) -> bool;
    async fn get_nodes(&self, primary: &mut NodeSession) -> Vec<String>;

    /// May append profile-specific flags to the agent command line.
    fn modify_command(&self, base: String) -> String {
        base
    }

    /// Additional remote file paths to retrieve from the primary after per-node
    /// collection completes, if any.
    async fn run_extra_cmd(&self, _primary: &mut NodeSession) -> Vec<String> {
        Vec::new()
    }
}

/// The reserved null profile (spec §4.2): enumerates no nodes and never
/// auto-matches. Addressable as both `none` and `jbon` ("just a bunch of nodes").
pub struct NoneProfile;

#[async_trait]
impl ClusterProfileKind for NoneProfile {
    fn short_name(&self) -> &'static str {
        "none"
    }

    fn human_name(&self) -> &'static str {
        "No cluster profile (just a bunch of nodes)"
    }

    async fn applies_here(&self, _primary: &mut NodeSession) -> bool {
        false
    }

    async fn get_nodes(&self, _primary: &mut NodeSession) -> Vec<String> {
        Vec::new()
    }
}

pub struct ClusterProfile {
    pub kind: Box<dyn ClusterProfileKind>,
    pub option_overrides: HashMap<&'static str, OptionValue>,
}

impl ClusterProfile {
    fn new(kind: Box<dyn ClusterProfileKind>) -> Self {
        Self {
            kind,
            option_overrides: HashMap::new(),
        }
    }

    pub fn short_name(&self) -> &'static str {
        self.kind.short_name()
    }

    /// Option coercion (spec §4.3): bools accept true/on/false/off case
    /// insensitively, ints are strict base-10, unknown names are fatal.
    pub fn apply_override(&mut self, name: &str, raw_value: &str) -> Result<(), Error> {
        let declared = self
            .kind
            .declared_options()
            .into_iter()
            .find(|o| o.name == name)
            .ok_or_else(|| Error::UnknownOption {
                cluster: self.short_name().to_string(),
                name: name.to_string(),
            })?;

        let coerced = match declared.default.option_type() {
            OptionType::Bool => {
                let lowered = raw_value.to_lowercase();
                match lowered.as_str() {
                    "true" | "on" => OptionValue::Bool(true),
                    "false" | "off" => OptionValue::Bool(false),
                    _ => {
                        return Err(Error::InvalidOptionValue {
                            cluster: self.short_name().to_string(),
                            name: name.to_string(),
                            expected: "bool (true/on/false/off)",
                            value: raw_value.to_string(),
                        })
                    }
                }
            }
            OptionType::Integer => raw_value
                .parse::<i64>()
                .map(OptionValue::Integer)
                .map_err(|_| Error::InvalidOptionValue {
                    cluster: self.short_name().to_string(),
                    name: name.to_string(),
                    expected: "integer",
                    value: raw_value.to_string(),
                })?,
            OptionType::String => OptionValue::String(raw_value.to_string()),
        };

        self.option_overrides.insert(declared.name, coerced);
        Ok(())
    }
}

/// Populated at startup by calling one register function per built-in profile
/// (Design Note §9), rather than the original's dynamic class-scanning approach.
pub struct ClusterRegistry {
    profiles: HashMap<&'static str, ClusterProfile>,
}

impl ClusterRegistry {
    pub fn with_builtin_profiles() -> Self {
        let mut registry = Self {
            profiles: HashMap::new(),
        };
        registry.register(Box::new(NoneProfile));
        registry
    }

    pub fn register(&mut self, kind: Box<dyn ClusterProfileKind>) {
        let name = kind.short_name();
        self.profiles.insert(name, ClusterProfile::new(kind));
    }

    pub fn get(&self, short_name: &str) -> Option<&ClusterProfile> {
        // "none" and "jbon" both address the reserved null profile.
        let canonical = if short_name == "jbon" { "none" } else { short_name };
        self.profiles.get(canonical)
    }

    pub fn get_mut(&mut self, short_name: &str) -> Option<&mut ClusterProfile> {
        let canonical = if short_name == "jbon" { "none" } else { short_name }.to_string();
        self.profiles.get_mut(canonical.as_str())
    }

    pub fn contains_option(&self, name: &str) -> bool {
        self.profiles
            .values()
            .any(|p| p.kind.declared_options().iter().any(|o| o.name == name))
    }

    /// Layered-profile resolution (spec §4.3): iterate profiles; on a match,
    /// re-check every profile whose `parent()` names the matched profile, and
    /// prefer a derived match over its parent. If multiple independent base
    /// profiles match, the first (by insertion-stable iteration) wins.
    pub async fn detect(&self, primary: &mut NodeSession) -> Option<&'static str> {
        let mut names: Vec<&'static str> = self.profiles.keys().copied().collect();
        names.sort_unstable();

        for &candidate in &names {
            if candidate == "none" {
                continue;
            }
            let profile = &self.profiles[candidate];
            if profile.kind.applies_here(primary).await {
                let mut winner = candidate;
                loop {
                    let derived = names
                        .iter()
                        .copied()
                        .find(|&n| self.profiles[n].kind.parent() == Some(winner));
                    match derived {
                        Some(d) if self.profiles[d].kind.applies_here(primary).await => {
                            winner = d;
                        }
                        _ => break,
                    }
                }
                return Some(winner);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    #[async_trait]
    impl ClusterProfileKind for Base {
        fn short_name(&self) -> &'static str {
            "base"
        }
        fn human_name(&self) -> &'static str {
            "Base"
        }
        fn declared_options(&self) -> Vec<DeclaredOption> {
            vec![DeclaredOption {
                name: "no-database",
                default: OptionValue::Bool(false),
                description: "skip database plugin",
            }]
        }
        async fn applies_here(&self, _primary: &mut NodeSession) -> bool {
            true
        }
        async fn get_nodes(&self, _primary: &mut NodeSession) -> Vec<String> {
            vec!["a.example".into()]
        }
    }

    struct Derived;
    #[async_trait]
    impl ClusterProfileKind for Derived {
        fn short_name(&self) -> &'static str {
            "derived"
        }
        fn human_name(&self) -> &'static str {
            "Derived"
        }
        fn parent(&self) -> Option<&'static str> {
            Some("base")
        }
        async fn applies_here(&self, _primary: &mut NodeSession) -> bool {
            true
        }
        async fn get_nodes(&self, _primary: &mut NodeSession) -> Vec<String> {
            vec!["a.example".into(), "b.example".into()]
        }
    }

    fn dummy_node() -> NodeSession {
        let creds = crate::credentials::Credentials::default();
        NodeSession::new("localhost", &creds, std::env::temp_dir())
    }

    #[tokio::test]
    async fn layered_profile_supersedes_base() {
        let mut registry = ClusterRegistry::with_builtin_profiles();
        registry.register(Box::new(Base));
        registry.register(Box::new(Derived));

        let mut node = dummy_node();
        let winner = registry.detect(&mut node).await;
        assert_eq!(winner, Some("derived"));
    }

    #[test]
    fn bool_option_coercion_accepts_documented_values() {
        let mut registry = ClusterRegistry::with_builtin_profiles();
        registry.register(Box::new(Base));
        let profile = registry.get_mut("base").unwrap();

        profile.apply_override("no-database", "False").unwrap();
        assert_eq!(
            profile.option_overrides.get("no-database"),
            Some(&OptionValue::Bool(false))
        );

        assert!(profile.apply_override("no-database", "maybe").is_err());
    }

    #[test]
    fn none_profile_is_addressable_as_jbon() {
        let registry = ClusterRegistry::with_builtin_profiles();
        assert_eq!(registry.get("none").unwrap().short_name(), "none");
        assert_eq!(registry.get("jbon").unwrap().short_name(), "none");
    }
}
