//! An allowlisted table with an unrepairable compound key is
//! backed up, emptied and re-keyed; its rows are not restored.

use pkr_db::inspect;
use pkr_reconcile::{reconcile_table, ReconciliationOutcome, RunParams};
use pkr_schema::{CatalogRecord, GenerationTag, SchemaCatalog, TableName};
use pkr_testkit::{FakeMySql, FakeTable, LoggedStatement};

#[tokio::test]
async fn allowlisted_compound_key_is_rebuilt_without_restore() -> anyhow::Result<()> {
    let mut db = FakeMySql::new().with_table(
        "Scratch",
        FakeTable::new(&[("a", "int(11)"), ("b", "int(11)"), ("note", "text")])
            .with_rows(&[&["1", "1", "x"], &["1", "1", "y"], &["2", "1", "z"]]),
    );
    let catalog = SchemaCatalog::from_records(vec![
        CatalogRecord::new("Scratch", "a", false),
        CatalogRecord::new("Scratch", "b", false),
    ]);
    let params = RunParams::new(GenerationTag::parse("0124")?).with_truncate_allowlist(["Scratch"]);
    let scratch = TableName::parse("Scratch")?;
    let actual = inspect::actual_keys(&mut db, &scratch).await?;

    let repair = reconcile_table(
        &mut db,
        &scratch,
        catalog.expected_keys(&scratch).unwrap(),
        &actual,
        &params,
    )
    .await?;

    assert_eq!(
        repair.outcome,
        ReconciliationOutcome::RepairedViaTruncateRebuild {
            backup_table: TableName::parse("Scratch_0124")?,
        }
    );
    assert_eq!(
        db.executed(),
        vec![
            "ALTER TABLE `Scratch` ADD PRIMARY KEY (`a`, `b`)",
            "CREATE TABLE `Scratch_0124` LIKE `Scratch`",
            "INSERT INTO `Scratch_0124` SELECT * FROM `Scratch`",
            "TRUNCATE TABLE `Scratch`",
            "ALTER TABLE `Scratch` ADD PRIMARY KEY (`a`, `b`)",
        ]
    );
    assert_eq!(db.row_count("Scratch"), 0);
    assert_eq!(db.row_count("Scratch_0124"), 3);
    assert_eq!(db.primary_key("Scratch"), vec!["a", "b"]);

    let copy = db.position_of("INSERT INTO `Scratch_0124`").unwrap();
    let truncate = db.position_of("TRUNCATE TABLE `Scratch`").unwrap();
    assert!(db.log()[copy..truncate].contains(&LoggedStatement::Commit));
    Ok(())
}
