//! Live Schema Inspector.
//!
//! Read-only introspection against `information_schema` for the connection's
//! current database. Failures are returned, never retried.

use serde::Serialize;
use tracing::debug;

use pkr_schema::{Ident, TableName};

use crate::session::{DbError, SqlSession};
use crate::sql::{self, AutoIncrementType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectionError {
    #[error("table {table} does not exist")]
    TableNotFound { table: String },

    #[error("introspection of {table} failed: {source}")]
    Query {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("table {table} has no column {column}")]
    MissingColumn { table: String, column: String },

    #[error("column {table}.{column} has type {column_type:?}, which cannot be AUTO_INCREMENT")]
    NotAutoIncrementCapable {
        table: String,
        column: String,
        column_type: String,
    },
}

impl InspectionError {
    fn query(table: impl Into<String>, source: DbError) -> Self {
        InspectionError::Query {
            table: table.into(),
            source,
        }
    }
}

/// One entry of the live primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyColumnDescriptor {
    pub column_name: String,
    /// 1-based position inside the key.
    pub seq_in_index: u32,
}

/// One live column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
    pub nullable: bool,
    pub extra: String,
}

impl ColumnInfo {
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

/// All base tables visible in the current schema, ordered by name.
///
/// Names are returned raw: the caller decides which of them are safe.
pub async fn table_universe(db: &mut dyn SqlSession) -> Result<Vec<String>, InspectionError> {
    let rows = db
        .fetch_rows(sql::select_base_tables())
        .await
        .map_err(|e| InspectionError::query("<schema>", e))?;

    rows.iter()
        .map(|r| {
            r.text(0)
                .map(str::to_string)
                .map_err(|e| InspectionError::query("<schema>", e))
        })
        .collect()
}

pub async fn table_exists(
    db: &mut dyn SqlSession,
    table: &TableName,
) -> Result<bool, InspectionError> {
    let rows = db
        .fetch_rows(&sql::select_table_exists(table))
        .await
        .map_err(|e| InspectionError::query(table.as_str(), e))?;
    Ok(!rows.is_empty())
}

/// Current primary-key definition, in key order. Empty when the table has
/// no primary key.
pub async fn actual_keys(
    db: &mut dyn SqlSession,
    table: &TableName,
) -> Result<Vec<KeyColumnDescriptor>, InspectionError> {
    let rows = db
        .fetch_rows(&sql::select_primary_key(table))
        .await
        .map_err(|e| InspectionError::query(table.as_str(), e))?;

    if rows.is_empty() && !table_exists(db, table).await? {
        return Err(InspectionError::TableNotFound {
            table: table.to_string(),
        });
    }

    let mut keys = Vec::with_capacity(rows.len());
    for r in &rows {
        let column_name = r
            .text(0)
            .map_err(|e| InspectionError::query(table.as_str(), e))?
            .to_string();
        let seq_in_index = r
            .text(1)
            .map_err(|e| InspectionError::query(table.as_str(), e))?
            .trim()
            .parse::<u32>()
            .map_err(|e| {
                InspectionError::query(
                    table.as_str(),
                    DbError::Decode(format!("SEQ_IN_INDEX: {e}")),
                )
            })?;
        keys.push(KeyColumnDescriptor {
            column_name,
            seq_in_index,
        });
    }

    debug!(table = %table, keys = keys.len(), "inspected primary key");
    Ok(keys)
}

/// Full column list in ordinal order.
pub async fn column_info(
    db: &mut dyn SqlSession,
    table: &TableName,
) -> Result<Vec<ColumnInfo>, InspectionError> {
    let rows = db
        .fetch_rows(&sql::select_columns(table))
        .await
        .map_err(|e| InspectionError::query(table.as_str(), e))?;

    // A table always has at least one column.
    if rows.is_empty() {
        return Err(InspectionError::TableNotFound {
            table: table.to_string(),
        });
    }

    rows.iter()
        .map(|r| -> Result<ColumnInfo, InspectionError> {
            let q = |e: DbError| InspectionError::query(table.as_str(), e);
            Ok(ColumnInfo {
                name: r.text(0).map_err(q)?.to_string(),
                column_type: r.text(1).map_err(q)?.to_string(),
                nullable: r.get(2).map(|v| v.eq_ignore_ascii_case("YES")).unwrap_or(false),
                extra: r.get(3).unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Column names only, in ordinal order.
pub async fn columns(
    db: &mut dyn SqlSession,
    table: &TableName,
) -> Result<Vec<String>, InspectionError> {
    Ok(column_info(db, table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

/// Live type of `column`, checked to be an integer type that can carry
/// `AUTO_INCREMENT`.
pub async fn auto_increment_type(
    db: &mut dyn SqlSession,
    table: &TableName,
    column: &Ident,
) -> Result<AutoIncrementType, InspectionError> {
    let cols = column_info(db, table).await?;
    let info = cols
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(column.as_str()))
        .ok_or_else(|| InspectionError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;

    AutoIncrementType::parse(&info.column_type).ok_or_else(|| {
        InspectionError::NotAutoIncrementCapable {
            table: table.to_string(),
            column: column.to_string(),
            column_type: info.column_type.clone(),
        }
    })
}
