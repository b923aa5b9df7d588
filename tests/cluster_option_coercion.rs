use async_trait::async_trait;

use sos_collector::cluster::{ClusterProfileKind, ClusterRegistry, DeclaredOption, OptionValue};
use sos_collector::node::NodeSession;

struct FakeOvirt;

#[async_trait]
impl ClusterProfileKind for FakeOvirt {
    fn short_name(&self) -> &'static str {
        "fake-ovirt"
    }

    fn human_name(&self) -> &'static str {
        "Fake oVirt"
    }

    fn declared_options(&self) -> Vec<DeclaredOption> {
        vec![
            DeclaredOption {
                name: "no-database",
                default: OptionValue::Bool(false),
                description: "skip the engine database dump",
            },
            DeclaredOption {
                name: "api-port",
                default: OptionValue::Integer(443),
                description: "engine API port",
            },
        ]
    }

    async fn applies_here(&self, _primary: &mut NodeSession) -> bool {
        false
    }

    async fn get_nodes(&self, _primary: &mut NodeSession) -> Vec<String> {
        Vec::new()
    }
}

#[test]
fn unknown_option_name_is_rejected() {
    let mut registry = ClusterRegistry::with_builtin_profiles();
    registry.register(Box::new(FakeOvirt));
    let profile = registry.get_mut("fake-ovirt").unwrap();

    assert!(profile.apply_override("does-not-exist", "true").is_err());
}

#[test]
fn bool_and_int_options_coerce_case_insensitively_and_strictly() {
    let mut registry = ClusterRegistry::with_builtin_profiles();
    registry.register(Box::new(FakeOvirt));
    let profile = registry.get_mut("fake-ovirt").unwrap();

    profile.apply_override("no-database", "ON").unwrap();
    assert_eq!(
        profile.option_overrides.get("no-database"),
        Some(&OptionValue::Bool(true))
    );

    profile.apply_override("api-port", "8443").unwrap();
    assert_eq!(profile.option_overrides.get("api-port"), Some(&OptionValue::Integer(8443)));

    assert!(profile.apply_override("api-port", "not-a-number").is_err());
}
