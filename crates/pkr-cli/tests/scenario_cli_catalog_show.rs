use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const SCHEMA_JSON: &str = r#"[
  {"table_name": "Alumno",  "primary_key_column": "id",      "auto_increment": "auto_increment"},
  {"table_name": "Notas",   "primary_key_column": "alumno",  "auto_increment": ""},
  {"table_name": "Notas",   "primary_key_column": "periodo", "auto_increment": ""},
  {"table_name": "Config",  "primary_key_column": "",        "auto_increment": ""},
  {"table_name": "bad-name","primary_key_column": "id",      "auto_increment": ""}
]"#;

fn schema_file() -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(SCHEMA_JSON.as_bytes()).unwrap();
    f
}

/// `pkr catalog show` needs no database.
#[test]
fn catalog_show_lists_keys_and_refused_entries() {
    let schema = schema_file();

    Command::cargo_bin("pkr")
        .unwrap()
        .env_remove("PKR_DATABASE_URL")
        .args(["catalog", "show", "--schema"])
        .arg(schema.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("table=Alumno keys=id(auto_increment)"))
        .stdout(predicate::str::contains("table=Notas keys=alumno,periodo"))
        .stdout(predicate::str::contains("invalid=bad-name"))
        .stdout(predicate::str::contains("note=names must be ASCII letters"))
        .stdout(predicate::str::contains("tables=2 invalid=1"))
        .stdout(predicate::str::contains("Config").not());
}

#[test]
fn catalog_show_json_is_parseable() {
    let schema = schema_file();

    let out = Command::cargo_bin("pkr")
        .unwrap()
        .args(["catalog", "show", "--json", "--schema"])
        .arg(schema.path())
        .output()
        .unwrap();
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["tables"][0]["table"], "Alumno");
    assert_eq!(v["tables"][0]["keys"][0]["is_autoincrement"], true);
    assert_eq!(v["tables"][1]["keys"][1]["column_name"], "periodo");
    assert_eq!(v["invalid"][0]["table"], "bad-name");
}

#[test]
fn missing_schema_file_fails() {
    Command::cargo_bin("pkr")
        .unwrap()
        .args(["catalog", "show", "--schema", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load schema catalog"));
}

#[test]
fn accented_table_name_is_refused_with_the_naming_rule() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(
        r#"[{"table_name": "Calificación", "primary_key_column": "id", "auto_increment": ""}]"#
            .as_bytes(),
    )
    .unwrap();

    Command::cargo_bin("pkr")
        .unwrap()
        .args(["catalog", "show", "--schema"])
        .arg(f.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("invalid=Calificación"))
        .stdout(predicate::str::contains("accented letters included"))
        .stdout(predicate::str::contains("tables=0 invalid=1"));
}

#[test]
fn clean_catalog_prints_no_naming_note() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(
        r#"[{"table_name": "Alumno", "primary_key_column": "id", "auto_increment": ""}]"#.as_bytes(),
    )
    .unwrap();

    Command::cargo_bin("pkr")
        .unwrap()
        .args(["catalog", "show", "--schema"])
        .arg(f.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("note=").not());
}
