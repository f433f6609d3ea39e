//! Restore Projector.
//!
//! Repopulates a (freshly truncated) table from its generation-tagged backup
//! while leaving one column out of both the insert and the select lists, so
//! the server assigns it (typically a regenerated `AUTO_INCREMENT` id).
//!
//! Does not check that the target is empty: sequencing is the engine's job.

use tracing::{error, info};

use pkr_schema::{GenerationTag, Ident, IdentifierError, TableName};

use crate::inspect::{self, InspectionError};
use crate::session::{DbError, SqlSession};
use crate::sql;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RestoreError {
    #[error("restore of {table}: unsafe identifier: {source}")]
    Identifier {
        table: String,
        #[source]
        source: IdentifierError,
    },

    #[error("restore of {table}: column list unavailable: {source}")]
    Inspection {
        table: String,
        #[source]
        source: InspectionError,
    },

    #[error("restore of {table}: no columns left after excluding {excluded}")]
    NoColumnsLeft { table: String, excluded: String },

    #[error("restore of {table} from {backup} failed: {source}")]
    Statement {
        table: String,
        backup: String,
        #[source]
        source: DbError,
    },
}

/// Live columns of `table` minus `excluded`, each one validated for use in
/// statement text. Read-only, so callers can run it before any mutation.
pub async fn restore_columns(
    db: &mut dyn SqlSession,
    table: &TableName,
    excluded: &Ident,
) -> Result<Vec<Ident>, RestoreError> {
    let live = inspect::columns(db, table)
        .await
        .map_err(|source| RestoreError::Inspection {
            table: table.to_string(),
            source,
        })?;

    let mut projected: Vec<Ident> = Vec::with_capacity(live.len());
    for name in live.iter().filter(|n| !n.eq_ignore_ascii_case(excluded.as_str())) {
        let col = Ident::parse(name).map_err(|source| RestoreError::Identifier {
            table: table.to_string(),
            source,
        })?;
        projected.push(col);
    }
    if projected.is_empty() {
        return Err(RestoreError::NoColumnsLeft {
            table: table.to_string(),
            excluded: excluded.to_string(),
        });
    }
    Ok(projected)
}

/// Copy every row of `{table}_{tag}` into `table`, without `excluded`.
///
/// Returns the projected column list.
pub async fn restore_excluding(
    db: &mut dyn SqlSession,
    table: &TableName,
    tag: &GenerationTag,
    excluded: &Ident,
) -> Result<Vec<Ident>, RestoreError> {
    let projected = restore_columns(db, table, excluded).await?;
    restore_projected(db, table, tag, &projected).await?;
    Ok(projected)
}

/// `INSERT INTO table (cols) SELECT cols FROM {table}_{tag}` for a column
/// list already produced by [`restore_columns`].
pub async fn restore_projected(
    db: &mut dyn SqlSession,
    table: &TableName,
    tag: &GenerationTag,
    projected: &[Ident],
) -> Result<(), RestoreError> {
    let backup_table = table
        .backup_name(tag)
        .map_err(|source| RestoreError::Identifier {
            table: table.to_string(),
            source,
        })?;

    let stmt = sql::copy_columns(table, &backup_table, projected);
    db.execute(&stmt).await.map_err(|source| {
        error!(table = %table, "restore failed: {source}");
        RestoreError::Statement {
            table: table.to_string(),
            backup: backup_table.to_string(),
            source,
        }
    })?;
    info!(table = %table, backup = %backup_table, "rows restored: {stmt}");
    Ok(())
}
