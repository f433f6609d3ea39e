use pkr_config::{load_layered_yaml, load_layered_yaml_from_strings, RunSettings};
use std::io::Write;

#[test]
fn settings_are_read_from_merged_layers() {
    let base = r#"
run:
  generation_tag: 20240124
  truncate_allowlist: ["Scratch"]
schema:
  path: "catalog/schema.json"
"#;
    let site = "run:\n  skip_tables: [\"Temp\", \"Audit\"]\n";
    let loaded = load_layered_yaml_from_strings(&[base, site]).unwrap();

    let settings = RunSettings::from_config_json(&loaded.config_json).unwrap();

    assert_eq!(settings.generation_tag.as_deref(), Some("20240124"));
    assert_eq!(settings.truncate_allowlist, vec!["Scratch"]);
    assert_eq!(settings.skip_tables, vec!["Temp", "Audit"]);
    assert_eq!(settings.schema_path.as_deref(), Some("catalog/schema.json"));
}

#[test]
fn missing_keys_are_empty() {
    let loaded = load_layered_yaml_from_strings(&["{}"]).unwrap();
    let settings = RunSettings::from_config_json(&loaded.config_json).unwrap();
    assert_eq!(settings, RunSettings::default());
}

#[test]
fn wrong_shape_is_a_type_error() {
    let loaded = load_layered_yaml_from_strings(&["run:\n  skip_tables: \"Temp\"\n"]).unwrap();
    let err = RunSettings::from_config_json(&loaded.config_json).unwrap_err();
    assert!(format!("{err:#}").contains("CONFIG_TYPE_ERROR /run/skip_tables"));
}

#[test]
fn files_are_layered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let over = dir.path().join("override.yaml");
    writeln!(
        std::fs::File::create(&base).unwrap(),
        "run:\n  generation_tag: \"0124\""
    )
    .unwrap();
    writeln!(
        std::fs::File::create(&over).unwrap(),
        "run:\n  generation_tag: \"0125\""
    )
    .unwrap();

    let loaded = load_layered_yaml(&[base.to_str().unwrap(), over.to_str().unwrap()]).unwrap();
    let settings = RunSettings::from_config_json(&loaded.config_json).unwrap();
    assert_eq!(settings.generation_tag.as_deref(), Some("0125"));

    assert!(load_layered_yaml(&[dir.path().join("nope.yaml").to_str().unwrap()]).is_err());
}
