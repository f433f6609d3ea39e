//! Reconciliation Engine: one table, one pass.
//!
//! ```text
//! Decision ──counts equal──────────────────────────────▶ no-op
//!    │ counts differ
//!    ▼
//! Preflight (inspect AUTO_INCREMENT column types; no mutation)
//!    ▼
//! Direct repair: [DROP PK] → ADD PK → MODIFY .. AUTO_INCREMENT*
//!    ├─ applied ─────────────────────────────────────────▶ repaired-direct
//!    └─ rejected
//!         ├─ single AUTO_INCREMENT key ─▶ [resolve restore columns] → backup → truncate → ADD PK → MODIFY → restore
//!         ├─ table in truncate allowlist ▶ backup → truncate → ADD PK
//!         └─ otherwise ───────────────────────────────────▶ failed (no mutation)
//! ```
//!
//! A rejected direct repair is an ordinary value ([`Attempt::Rejected`]) the
//! decision logic branches on; only conditions that end the table's repair
//! become a [`RepairError`].

use tracing::{error, info, warn};

use pkr_db::inspect::{self, KeyColumnDescriptor};
use pkr_db::sql::{self, AutoIncrementType};
use pkr_db::{DbError, SqlSession};
use pkr_schema::{ExpectedKeyColumn, Ident, TableName};

use crate::types::{
    FallbackError, ReconciliationOutcome, RecoveryPath, RepairError, RunParams, TableRepair,
};

/// Result of running a statement sequence that the server may refuse.
#[derive(Debug)]
enum Attempt {
    Applied,
    Rejected(DbError),
}

/// Entry / Decision: only the number of key columns is compared.
pub fn needs_repair(expected: &[ExpectedKeyColumn], actual: &[KeyColumnDescriptor]) -> bool {
    expected.len() != actual.len()
}

/// Recovery branch a rejected direct repair would take, in priority order.
pub fn recovery_path(
    table: &TableName,
    expected: &[ExpectedKeyColumn],
    params: &RunParams,
) -> Option<RecoveryPath> {
    match expected {
        [only] if only.is_autoincrement => Some(RecoveryPath::AutoIncrementRebuild),
        _ if params.may_truncate(table) => Some(RecoveryPath::TruncateRebuild),
        _ => None,
    }
}

/// Reconcile one table whose live key was just inspected.
pub async fn reconcile_table(
    db: &mut dyn SqlSession,
    table: &TableName,
    expected: &[ExpectedKeyColumn],
    actual: &[KeyColumnDescriptor],
    params: &RunParams,
) -> Result<TableRepair, RepairError> {
    info!(table = %table, "processing table");
    info!(table = %table, "current primary keys: {:?}", key_names(actual));
    info!(table = %table, "expected primary keys: {:?}", expected);

    if !needs_repair(expected, actual) {
        info!(table = %table, "key count matches, nothing to do");
        return Ok(TableRepair {
            outcome: ReconciliationOutcome::NoOp,
            verified_keys: None,
        });
    }

    let key_columns: Vec<Ident> = expected.iter().map(|k| k.column_name.clone()).collect();
    let auto_columns = preflight_auto_increment(db, table, expected).await?;

    let attempt = direct_repair(db, table, &key_columns, &auto_columns, !actual.is_empty()).await;
    let outcome = match attempt {
        Attempt::Applied => ReconciliationOutcome::RepairedDirect,
        Attempt::Rejected(direct) => {
            let path = match recovery_path(table, expected, params) {
                Some(path) => path,
                None => {
                    error!(table = %table, "primary key addition failed: {direct}");
                    return Err(RepairError::Rejected {
                        table: table.to_string(),
                        source: direct,
                    });
                }
            };

            warn!(
                table = %table,
                path = %path,
                "primary key addition failed ({direct}); backing up and truncating"
            );

            let rebuilt = match path {
                RecoveryPath::AutoIncrementRebuild => {
                    autoincrement_rebuild(db, table, &key_columns, &auto_columns, params).await
                }
                RecoveryPath::TruncateRebuild => {
                    truncate_rebuild(db, table, &key_columns, params).await
                }
            };

            match rebuilt {
                Ok(outcome) => outcome,
                Err(fallback) => {
                    if let Err(rb) = db.rollback().await {
                        error!(table = %table, "rollback after failed {path} also failed: {rb}");
                    }
                    error!(table = %table, "failed to handle primary key addition: {fallback}");
                    return Err(RepairError::FallbackFailed {
                        table: table.to_string(),
                        path,
                        direct,
                        source: fallback,
                    });
                }
            }
        }
    };

    let verified_keys = verify(db, table).await;
    Ok(TableRepair {
        outcome,
        verified_keys,
    })
}

/// Resolve the live integer type of every AUTO_INCREMENT column before any
/// mutation, so a missing or non-integer column fails the table untouched.
async fn preflight_auto_increment(
    db: &mut dyn SqlSession,
    table: &TableName,
    expected: &[ExpectedKeyColumn],
) -> Result<Vec<(Ident, AutoIncrementType)>, RepairError> {
    let mut out = Vec::new();
    for key in expected.iter().filter(|k| k.is_autoincrement) {
        let ty = inspect::auto_increment_type(db, table, &key.column_name).await?;
        out.push((key.column_name.clone(), ty));
    }
    Ok(out)
}

async fn direct_repair(
    db: &mut dyn SqlSession,
    table: &TableName,
    key_columns: &[Ident],
    auto_columns: &[(Ident, AutoIncrementType)],
    has_primary_key: bool,
) -> Attempt {
    let mut statements = Vec::with_capacity(2 + auto_columns.len());
    if has_primary_key {
        statements.push(sql::drop_primary_key(table));
    }
    statements.push(sql::add_primary_key(table, key_columns));
    for (col, ty) in auto_columns {
        statements.push(sql::modify_auto_increment(table, col, ty));
    }

    for stmt in &statements {
        info!(table = %table, "executing: {stmt}");
        if let Err(e) = db.execute(stmt).await {
            return Attempt::Rejected(e);
        }
    }
    match db.commit().await {
        Ok(()) => Attempt::Applied,
        Err(e) => Attempt::Rejected(e),
    }
}

async fn autoincrement_rebuild(
    db: &mut dyn SqlSession,
    table: &TableName,
    key_columns: &[Ident],
    auto_columns: &[(Ident, AutoIncrementType)],
    params: &RunParams,
) -> Result<ReconciliationOutcome, FallbackError> {
    // Single-column key: that column is the one the server regenerates.
    // The restore column list is resolved before the backup so a name that
    // cannot be put in statement text fails the table with its rows intact.
    let restore = match auto_columns.first() {
        Some((col, _)) => Some(pkr_db::restore_columns(db, table, col).await?),
        None => None,
    };

    let receipt = pkr_db::backup(db, table, &params.generation_tag).await?;
    pkr_db::truncate(db, &receipt).await?;

    reapply_primary_key(db, table, key_columns).await?;
    for (col, ty) in auto_columns {
        exec(db, table, &sql::modify_auto_increment(table, col, ty)).await?;
    }

    if let Some(projected) = &restore {
        pkr_db::restore_projected(db, table, &params.generation_tag, projected).await?;
    }
    db.commit().await.map_err(FallbackError::Statement)?;

    Ok(ReconciliationOutcome::RepairedViaAutoincrementRebuild {
        backup_table: receipt.backup_table,
    })
}

async fn truncate_rebuild(
    db: &mut dyn SqlSession,
    table: &TableName,
    key_columns: &[Ident],
    params: &RunParams,
) -> Result<ReconciliationOutcome, FallbackError> {
    let receipt = pkr_db::backup(db, table, &params.generation_tag).await?;
    pkr_db::truncate(db, &receipt).await?;

    // Rows are intentionally not restored: the table is on the allowlist.
    reapply_primary_key(db, table, key_columns).await?;
    db.commit().await.map_err(FallbackError::Statement)?;

    Ok(ReconciliationOutcome::RepairedViaTruncateRebuild {
        backup_table: receipt.backup_table,
    })
}

/// ADD PRIMARY KEY on the now-empty table. The key is re-inspected first:
/// if the rejected direct attempt got as far as adding it, it is dropped.
async fn reapply_primary_key(
    db: &mut dyn SqlSession,
    table: &TableName,
    key_columns: &[Ident],
) -> Result<(), FallbackError> {
    let current = inspect::actual_keys(db, table).await?;
    if !current.is_empty() {
        exec(db, table, &sql::drop_primary_key(table)).await?;
    }
    info!(table = %table, "retrying primary key addition");
    exec(db, table, &sql::add_primary_key(table, key_columns)).await
}

async fn exec(db: &mut dyn SqlSession, table: &TableName, stmt: &str) -> Result<(), FallbackError> {
    info!(table = %table, "executing: {stmt}");
    db.execute(stmt).await.map_err(FallbackError::Statement)
}

/// Observational only: a failed verification never changes the outcome.
async fn verify(db: &mut dyn SqlSession, table: &TableName) -> Option<Vec<KeyColumnDescriptor>> {
    match inspect::actual_keys(db, table).await {
        Ok(keys) => {
            info!(table = %table, "updated primary keys: {:?}", key_names(&keys));
            Some(keys)
        }
        Err(e) => {
            warn!(table = %table, "could not verify updated primary key: {e}");
            None
        }
    }
}

fn key_names(keys: &[KeyColumnDescriptor]) -> Vec<&str> {
    keys.iter().map(|k| k.column_name.as_str()).collect()
}
