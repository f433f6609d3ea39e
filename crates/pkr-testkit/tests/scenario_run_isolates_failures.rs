//! Run Coordinator: every table in the universe gets exactly one outcome,
//! a failing table never stops the ones after it, and the report accounts
//! for everything.

use pkr_db::inspect;
use pkr_reconcile::{run, OutcomeKind, ReconciliationOutcome, RunParams, SkipReason};
use pkr_schema::{CatalogRecord, GenerationTag, SchemaCatalog};
use pkr_testkit::{FakeMySql, FakeTable};

fn schema() -> FakeMySql {
    FakeMySql::new()
        // Compound key with duplicates, not allowlisted: fails.
        .with_table(
            "Alpha",
            FakeTable::new(&[("a", "int(11)"), ("b", "int(11)")])
                .with_rows(&[&["1", "1"], &["1", "1"]]),
        )
        // Plain missing key: repaired in place.
        .with_table(
            "Beta",
            FakeTable::new(&[("id", "int(11)"), ("v", "text")]).with_rows(&[&["1", "x"]]),
        )
        .with_table(
            "Gamma",
            FakeTable::new(&[("id", "int(11)")])
                .with_primary_key(&["id"])
                .with_rows(&[&["1"]]),
        )
        .with_table("Ignored", FakeTable::new(&[("id", "int(11)")]))
        .with_table("Unlisted", FakeTable::new(&[("id", "int(11)")]))
}

fn catalog() -> SchemaCatalog {
    SchemaCatalog::from_records(vec![
        CatalogRecord::new("Alpha", "a", false),
        CatalogRecord::new("Alpha", "b", false),
        CatalogRecord::new("Beta", "id", true),
        CatalogRecord::new("Gamma", "id", true),
        CatalogRecord::new("Ignored", "id", true),
    ])
}

fn params() -> RunParams {
    RunParams::new(GenerationTag::parse("0124").unwrap()).with_skip_set(["Ignored"])
}

#[tokio::test]
async fn failing_table_does_not_stop_later_tables() -> anyhow::Result<()> {
    let mut db = schema();
    let universe = inspect::table_universe(&mut db).await?;
    assert_eq!(universe, vec!["Alpha", "Beta", "Gamma", "Ignored", "Unlisted"]);

    let report = run(&mut db, &catalog(), &universe, &params()).await;

    assert_eq!(report.outcomes.len(), universe.len());
    assert!(report.outcome_for("Alpha").unwrap().is_failed());
    assert_eq!(
        report.outcome_for("Beta"),
        Some(&ReconciliationOutcome::RepairedDirect)
    );
    assert_eq!(report.outcome_for("Gamma"), Some(&ReconciliationOutcome::NoOp));
    assert_eq!(
        report.outcome_for("Ignored"),
        Some(&ReconciliationOutcome::Skipped {
            reason: SkipReason::SkipList
        })
    );
    assert_eq!(
        report.outcome_for("Unlisted"),
        Some(&ReconciliationOutcome::Skipped {
            reason: SkipReason::NotInCatalog
        })
    );

    assert_eq!(report.failed_tables(), vec!["Alpha"]);
    assert!(report.failures[0].error.contains("Duplicate entry"));
    assert!(!report.is_clean());
    assert_eq!(report.count(OutcomeKind::Skipped), 2);
    assert!(report.final_commit_error.is_none());

    assert_eq!(db.primary_key("Beta"), vec!["id"]);
    assert!(db.executed_for("Ignored").is_empty());
    Ok(())
}

#[tokio::test]
async fn skipped_table_is_never_inspected() -> anyhow::Result<()> {
    let mut db = schema();
    let universe = vec!["Ignored".to_string()];

    run(&mut db, &catalog(), &universe, &params()).await;

    let touched = db.log().iter().any(|s| format!("{s:?}").contains("Ignored"));
    assert!(!touched);
    Ok(())
}

#[tokio::test]
async fn invalid_catalog_entry_is_reported_failed() -> anyhow::Result<()> {
    let mut db = FakeMySql::new().with_table("bad-table", FakeTable::new(&[("id", "int(11)")]));
    let catalog = SchemaCatalog::from_records(vec![CatalogRecord::new("bad-table", "id", true)]);
    let universe = inspect::table_universe(&mut db).await?;

    let report = run(&mut db, &catalog, &universe, &params()).await;

    assert_eq!(report.failed_tables(), vec!["bad-table"]);
    assert!(report.failures[0].error.contains("unsafe identifier"));
    assert!(db.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn vanished_table_fails_with_inspection_error() -> anyhow::Result<()> {
    let mut db = schema();
    let universe = vec!["Gone".to_string(), "Beta".to_string()];
    let catalog = SchemaCatalog::from_records(vec![
        CatalogRecord::new("Gone", "id", true),
        CatalogRecord::new("Beta", "id", true),
    ]);

    let report = run(&mut db, &catalog, &universe, &params()).await;

    assert_eq!(report.failed_tables(), vec!["Gone"]);
    assert!(report.failures[0].error.contains("does not exist"));
    assert_eq!(
        report.outcome_for("Beta"),
        Some(&ReconciliationOutcome::RepairedDirect)
    );
    Ok(())
}

#[tokio::test]
async fn final_commit_failure_is_recorded() -> anyhow::Result<()> {
    let mut db = schema();
    db.fail_when("COMMIT", "server has gone away");
    let universe = vec!["Gamma".to_string()];

    let report = run(&mut db, &catalog(), &universe, &params()).await;

    assert_eq!(report.outcome_for("Gamma"), Some(&ReconciliationOutcome::NoOp));
    let err = report.final_commit_error.expect("commit error recorded");
    assert!(err.contains("server has gone away"));
    Ok(())
}

#[tokio::test]
async fn report_serializes_outcome_kinds() -> anyhow::Result<()> {
    let mut db = schema();
    let universe = inspect::table_universe(&mut db).await?;
    let report = run(&mut db, &catalog(), &universe, &params()).await;

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["generation_tag"], "0124");
    let kinds: Vec<&str> = json["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["outcome"]["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["failed", "repaired-direct", "no-op", "skipped", "skipped"]
    );
    Ok(())
}
