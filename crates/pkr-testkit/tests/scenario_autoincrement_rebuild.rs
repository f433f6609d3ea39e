//! A single AUTO_INCREMENT key that cannot be added in place is rebuilt
//! through backup, truncate, re-key and a restore that lets the server
//! renumber the key. This path also wins over the truncate allowlist.

use pkr_db::inspect;
use pkr_db::RestoreError;
use pkr_reconcile::{
    reconcile_table, FallbackError, ReconciliationOutcome, RecoveryPath, RepairError, RunParams,
};
use pkr_schema::{CatalogRecord, GenerationTag, SchemaCatalog, TableName};
use pkr_testkit::{FakeMySql, FakeTable, LoggedStatement};

fn baz_with_duplicate_ids() -> FakeMySql {
    FakeMySql::new().with_table(
        "Baz",
        FakeTable::new(&[("id", "int(10) unsigned"), ("name", "varchar(40)")])
            .with_rows(&[&["1", "a"], &["1", "b"], &["2", "c"]]),
    )
}

fn params(allow: &[&str]) -> RunParams {
    RunParams::new(GenerationTag::parse("0124").unwrap())
        .with_truncate_allowlist(allow.iter().copied())
}

#[tokio::test]
async fn duplicate_ids_are_renumbered_through_backup() -> anyhow::Result<()> {
    let mut db = baz_with_duplicate_ids();
    let catalog = SchemaCatalog::from_records(vec![CatalogRecord::new("Baz", "id", true)]);
    let baz = TableName::parse("Baz")?;
    let actual = inspect::actual_keys(&mut db, &baz).await?;

    let repair = reconcile_table(
        &mut db,
        &baz,
        catalog.expected_keys(&baz).unwrap(),
        &actual,
        &params(&[]),
    )
    .await?;

    assert_eq!(
        repair.outcome,
        ReconciliationOutcome::RepairedViaAutoincrementRebuild {
            backup_table: TableName::parse("Baz_0124")?,
        }
    );

    assert_eq!(
        db.executed(),
        vec![
            "ALTER TABLE `Baz` ADD PRIMARY KEY (`id`)",
            "CREATE TABLE `Baz_0124` LIKE `Baz`",
            "INSERT INTO `Baz_0124` SELECT * FROM `Baz`",
            "TRUNCATE TABLE `Baz`",
            "ALTER TABLE `Baz` ADD PRIMARY KEY (`id`)",
            "ALTER TABLE `Baz` MODIFY COLUMN `id` int(10) unsigned NOT NULL AUTO_INCREMENT",
            "INSERT INTO `Baz` (`name`) SELECT `name` FROM `Baz_0124`",
        ]
    );

    // Backup is complete and untouched.
    assert_eq!(db.row_count("Baz_0124"), 3);
    assert_eq!(
        db.table("Baz_0124").unwrap().values("id"),
        vec![Some("1".into()), Some("1".into()), Some("2".into())]
    );

    // Live table got every row back with fresh ids.
    let live = db.table("Baz").unwrap();
    assert_eq!(
        live.values("id"),
        vec![Some("1".into()), Some("2".into()), Some("3".into())]
    );
    assert_eq!(
        live.values("name"),
        vec![Some("a".into()), Some("b".into()), Some("c".into())]
    );
    assert_eq!(db.primary_key("Baz"), vec!["id"]);
    assert!(live.column("id").unwrap().auto_increment);
    Ok(())
}

#[tokio::test]
async fn backup_is_committed_strictly_before_truncate() -> anyhow::Result<()> {
    let mut db = baz_with_duplicate_ids();
    let catalog = SchemaCatalog::from_records(vec![CatalogRecord::new("Baz", "id", true)]);
    let baz = TableName::parse("Baz")?;
    let actual = inspect::actual_keys(&mut db, &baz).await?;
    reconcile_table(
        &mut db,
        &baz,
        catalog.expected_keys(&baz).unwrap(),
        &actual,
        &params(&[]),
    )
    .await?;

    let copy = db.position_of("INSERT INTO `Baz_0124` SELECT *").unwrap();
    let truncate = db.position_of("TRUNCATE TABLE `Baz`").unwrap();
    assert!(copy < truncate);
    assert!(
        db.log()[copy..truncate].contains(&LoggedStatement::Commit),
        "row copy must be committed before the truncate"
    );
    Ok(())
}

#[tokio::test]
async fn single_autoincrement_key_wins_over_truncate_allowlist() -> anyhow::Result<()> {
    let mut db = baz_with_duplicate_ids();
    let catalog = SchemaCatalog::from_records(vec![CatalogRecord::new("Baz", "id", true)]);
    let baz = TableName::parse("Baz")?;
    let actual = inspect::actual_keys(&mut db, &baz).await?;

    let repair = reconcile_table(
        &mut db,
        &baz,
        catalog.expected_keys(&baz).unwrap(),
        &actual,
        &params(&["Baz"]),
    )
    .await?;

    assert!(matches!(
        repair.outcome,
        ReconciliationOutcome::RepairedViaAutoincrementRebuild { .. }
    ));
    // Rows were restored, not discarded.
    assert_eq!(db.row_count("Baz"), 3);
    Ok(())
}

#[tokio::test]
async fn key_added_before_a_rejected_modify_is_dropped_on_rebuild() -> anyhow::Result<()> {
    let mut db = FakeMySql::new().with_table(
        "Foo",
        FakeTable::new(&[("id", "bigint(20)"), ("v", "text")])
            .with_rows(&[&["10", "a"], &["20", "b"]]),
    );
    db.fail_once_when("MODIFY COLUMN `id`", "Lock wait timeout exceeded");

    let catalog = SchemaCatalog::from_records(vec![CatalogRecord::new("Foo", "id", true)]);
    let foo = TableName::parse("Foo")?;
    let actual = inspect::actual_keys(&mut db, &foo).await?;

    let repair = reconcile_table(
        &mut db,
        &foo,
        catalog.expected_keys(&foo).unwrap(),
        &actual,
        &params(&[]),
    )
    .await?;

    assert!(matches!(
        repair.outcome,
        ReconciliationOutcome::RepairedViaAutoincrementRebuild { .. }
    ));
    let truncate = db.position_of("TRUNCATE TABLE `Foo`").unwrap();
    let drop = db.position_of("ALTER TABLE `Foo` DROP PRIMARY KEY").unwrap();
    assert!(truncate < drop, "leftover key from the direct attempt is dropped");
    assert_eq!(db.primary_key("Foo"), vec!["id"]);
    assert_eq!(db.row_count("Foo"), 2);
    Ok(())
}

#[tokio::test]
async fn unquotable_column_fails_the_rebuild_before_truncate() -> anyhow::Result<()> {
    let mut db = FakeMySql::new().with_table(
        "Periodo",
        FakeTable::new(&[("id", "int(11)"), ("Año", "int(11)")])
            .with_rows(&[&["1", "2023"], &["1", "2024"]]),
    );
    let catalog = SchemaCatalog::from_records(vec![CatalogRecord::new("Periodo", "id", true)]);
    let periodo = TableName::parse("Periodo")?;
    let actual = inspect::actual_keys(&mut db, &periodo).await?;

    let err = reconcile_table(
        &mut db,
        &periodo,
        catalog.expected_keys(&periodo).unwrap(),
        &actual,
        &params(&[]),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        RepairError::FallbackFailed {
            path: RecoveryPath::AutoIncrementRebuild,
            source: FallbackError::Restore(RestoreError::Identifier { .. }),
            ..
        }
    ));
    assert!(db.position_of("TRUNCATE").is_none());
    assert!(db.position_of("CREATE TABLE").is_none());
    assert!(!db.has_table("Periodo_0124"));
    assert_eq!(db.row_count("Periodo"), 2);
    Ok(())
}
