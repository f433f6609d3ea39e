//! Backup Manager.
//!
//! # Backup-before-destroy
//!
//! [`truncate`] takes a [`BackupReceipt`], and the only way to obtain one is
//! a successful [`backup`] of the same table. The receipt's `_priv` field is
//! private to this crate, so callers cannot fabricate one:
//!
//! ```text
//! ✅  let receipt = backup(db, &table, &tag).await?;  truncate(db, &receipt).await?;
//! ❌  truncate(db, &BackupReceipt { .. })             // ERROR: private field
//! ```
//!
//! Both backup statements are committed individually, so the copy survives
//! a rollback triggered by any later step of the same repair.

use serde::Serialize;
use tracing::{error, info};

use pkr_schema::{GenerationTag, IdentifierError, TableName};

use crate::inspect::{self, InspectionError};
use crate::session::{DbError, SqlSession};
use crate::sql;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackupError {
    #[error("backup name for {table} is not a safe identifier: {source}")]
    Identifier {
        table: String,
        #[source]
        source: IdentifierError,
    },

    #[error("backup table {backup} already exists")]
    AlreadyExists { backup: String },

    #[error("could not check for existing backup of {table}: {source}")]
    Inspection {
        table: String,
        #[source]
        source: InspectionError,
    },

    #[error("cloning structure of {table} into {backup} failed: {source}")]
    Clone {
        table: String,
        backup: String,
        #[source]
        source: DbError,
    },

    /// Structure was cloned but the row copy failed: `backup` exists and is
    /// incomplete. Never truncate after this.
    #[error("copying rows of {table} into {backup} failed; backup is partial: {source}")]
    Partial {
        table: String,
        backup: String,
        #[source]
        source: DbError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TruncateError {
    #[error("truncating {table} failed: {source}")]
    Statement {
        table: String,
        #[source]
        source: DbError,
    },
}

/// Proof that `table` was fully copied into `backup_table` and committed.
#[allow(clippy::manual_non_exhaustive)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReceipt {
    pub table: TableName,
    pub backup_table: TableName,
    pub generation_tag: GenerationTag,
    #[serde(skip)]
    _priv: (),
}

/// Clone `table`'s structure into `{table}_{tag}` and copy every row.
pub async fn backup(
    db: &mut dyn SqlSession,
    table: &TableName,
    tag: &GenerationTag,
) -> Result<BackupReceipt, BackupError> {
    let backup_table = table
        .backup_name(tag)
        .map_err(|source| BackupError::Identifier {
            table: table.to_string(),
            source,
        })?;

    let exists = inspect::table_exists(db, &backup_table)
        .await
        .map_err(|source| BackupError::Inspection {
            table: table.to_string(),
            source,
        })?;
    if exists {
        error!(table = %table, backup = %backup_table, "backup table already exists");
        return Err(BackupError::AlreadyExists {
            backup: backup_table.to_string(),
        });
    }

    let create = sql::create_table_like(&backup_table, table);
    let committed = match db.execute(&create).await {
        Ok(()) => db.commit().await,
        Err(e) => Err(e),
    };
    committed.map_err(|source| BackupError::Clone {
        table: table.to_string(),
        backup: backup_table.to_string(),
        source,
    })?;
    info!(table = %table, "table structure backed up: {create}");

    let copy = sql::copy_all_rows(&backup_table, table);
    let committed = match db.execute(&copy).await {
        Ok(()) => db.commit().await,
        Err(e) => Err(e),
    };
    committed.map_err(|source| {
        error!(table = %table, backup = %backup_table, "row copy failed, backup is partial");
        BackupError::Partial {
            table: table.to_string(),
            backup: backup_table.to_string(),
            source,
        }
    })?;
    info!(table = %table, "table data backed up: {copy}");

    Ok(BackupReceipt {
        table: table.clone(),
        backup_table,
        generation_tag: tag.clone(),
        _priv: (),
    })
}

/// Empty the table the receipt was issued for, keeping its structure.
pub async fn truncate(
    db: &mut dyn SqlSession,
    receipt: &BackupReceipt,
) -> Result<(), TruncateError> {
    let stmt = sql::truncate_table(&receipt.table);
    let done = match db.execute(&stmt).await {
        Ok(()) => db.commit().await,
        Err(e) => Err(e),
    };
    done.map_err(|source| TruncateError::Statement {
        table: receipt.table.to_string(),
        source,
    })?;
    info!(table = %receipt.table, backup = %receipt.backup_table, "table truncated: {stmt}");
    Ok(())
}
