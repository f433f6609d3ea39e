//! Unused-key guard: a misspelt key should not silently fall back to a
//! default.

use pkr_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigCommand, UnusedKeyPolicy,
};

const YAML_WITH_TYPO: &str = r#"
run:
  generation_tag: "0124"
  truncate_alowlist: ["Scratch"]
schema:
  path: "schema.json"
"#;

#[test]
fn typo_is_reported_under_warn() {
    let loaded = load_layered_yaml_from_strings(&[YAML_WITH_TYPO]).unwrap();
    let report = report_unused_keys(
        ConfigCommand::Reconcile,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.unused_leaf_pointers, vec!["/run/truncate_alowlist/0"]);
    assert_eq!(report.command, "RECONCILE");
}

#[test]
fn typo_fails_under_fail() {
    let loaded = load_layered_yaml_from_strings(&[YAML_WITH_TYPO]).unwrap();
    let err = report_unused_keys(
        ConfigCommand::Reconcile,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.contains("CONFIG_UNUSED_KEYS"), "{msg}");
    assert!(msg.contains("truncate_alowlist"), "{msg}");
}

#[test]
fn plan_does_not_consume_generation_tag() {
    let yaml = "run:\n  generation_tag: \"0124\"\n  skip_tables: []\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();

    let plan = report_unused_keys(ConfigCommand::Plan, &loaded.config_json, UnusedKeyPolicy::Warn)
        .unwrap();
    assert_eq!(plan.unused_leaf_pointers, vec!["/run/generation_tag"]);

    let reconcile = report_unused_keys(
        ConfigCommand::Reconcile,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap();
    assert!(reconcile.is_clean());
}
