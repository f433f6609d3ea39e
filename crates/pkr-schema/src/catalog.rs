//! Schema Catalog: table name -> expected primary-key columns.
//!
//! Source format is a JSON array of flat records, one per key column:
//!
//! ```text
//! [
//!   {"table_name": "Actas", "primary_key_column": "Cod_acta", "auto_increment": "auto_increment"},
//!   {"table_name": "Notas", "primary_key_column": "Cod_est",  "auto_increment": ""},
//!   {"table_name": "Notas", "primary_key_column": "Periodo",  "auto_increment": ""}
//! ]
//! ```
//!
//! Records of the same table are grouped in input order, which is the column
//! order of a compound key. An empty `primary_key_column` contributes no key.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ident::{Ident, TableName};

/// Literal value of `auto_increment` that flags a column.
pub const AUTO_INCREMENT_MARKER: &str = "auto_increment";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read schema catalog {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schema catalog is not a JSON array of records")]
    Parse(#[from] serde_json::Error),
}

/// One record of the declarative source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub table_name: String,
    #[serde(default)]
    pub primary_key_column: String,
    #[serde(default)]
    pub auto_increment: String,
}

impl CatalogRecord {
    pub fn new(
        table_name: impl Into<String>,
        primary_key_column: impl Into<String>,
        auto_increment: bool,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key_column: primary_key_column.into(),
            auto_increment: if auto_increment {
                AUTO_INCREMENT_MARKER.to_string()
            } else {
                String::new()
            },
        }
    }

    fn is_autoincrement(&self) -> bool {
        self.auto_increment
            .trim()
            .eq_ignore_ascii_case(AUTO_INCREMENT_MARKER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedKeyColumn {
    pub column_name: Ident,
    pub is_autoincrement: bool,
}

impl ExpectedKeyColumn {
    pub fn new(column_name: Ident, is_autoincrement: bool) -> Self {
        Self {
            column_name,
            is_autoincrement,
        }
    }
}

/// Result of looking a live table name up in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogLookup<'a> {
    /// Declared with a non-empty, fully valid key.
    Expected(&'a TableName, &'a [ExpectedKeyColumn]),
    /// Declared, but its table or column names failed validation.
    Invalid(&'a str),
    /// Not declared (or declared without a key).
    Absent,
}

/// Immutable for the lifetime of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    tables: BTreeMap<TableName, Vec<ExpectedKeyColumn>>,
    /// Raw table name -> why it was refused. Kept so the run reports these
    /// tables as failed instead of silently ignoring them.
    invalid: BTreeMap<String, String>,
}

impl SchemaCatalog {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CatalogRecord>,
    {
        // Group first (input order within a table), validate second.
        let mut grouped: BTreeMap<String, Vec<CatalogRecord>> = BTreeMap::new();
        for rec in records {
            if rec.primary_key_column.trim().is_empty() {
                continue;
            }
            grouped.entry(rec.table_name.clone()).or_default().push(rec);
        }

        let mut catalog = SchemaCatalog::default();
        for (raw_table, recs) in grouped {
            match validate_table(&raw_table, &recs) {
                Ok((table, keys)) => {
                    catalog.tables.insert(table, keys);
                }
                Err(reason) => {
                    catalog.invalid.insert(raw_table, reason);
                }
            }
        }
        catalog
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let records: Vec<CatalogRecord> = serde_json::from_str(raw)?;
        Ok(Self::from_records(records))
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn expected_keys(&self, table: &TableName) -> Option<&[ExpectedKeyColumn]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn lookup(&self, raw_table: &str) -> CatalogLookup<'_> {
        if let Some(reason) = self.invalid.get(raw_table) {
            return CatalogLookup::Invalid(reason);
        }
        match TableName::parse(raw_table) {
            Ok(name) => match self.tables.get_key_value(&name) {
                Some((t, keys)) => CatalogLookup::Expected(t, keys),
                None => CatalogLookup::Absent,
            },
            Err(_) => CatalogLookup::Absent,
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = (&TableName, &[ExpectedKeyColumn])> {
        self.tables.iter().map(|(t, k)| (t, k.as_slice()))
    }

    pub fn invalid(&self) -> impl Iterator<Item = (&str, &str)> {
        self.invalid.iter().map(|(t, r)| (t.as_str(), r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn validate_table(
    raw_table: &str,
    recs: &[CatalogRecord],
) -> Result<(TableName, Vec<ExpectedKeyColumn>), String> {
    let table = TableName::parse(raw_table).map_err(|e| format!("table name: {e}"))?;

    let mut keys: Vec<ExpectedKeyColumn> = Vec::with_capacity(recs.len());
    for rec in recs {
        let col = Ident::parse(rec.primary_key_column.trim())
            .map_err(|e| format!("key column: {e}"))?;
        if keys.iter().any(|k| k.column_name == col) {
            return Err(format!("key column {col} listed more than once"));
        }
        keys.push(ExpectedKeyColumn::new(col, rec.is_autoincrement()));
    }
    Ok((table, keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_trimmed_and_case_insensitive() {
        assert!(CatalogRecord::new("t", "id", true).is_autoincrement());
        let mut rec = CatalogRecord::new("t", "id", false);
        assert!(!rec.is_autoincrement());
        rec.auto_increment = " AUTO_INCREMENT ".to_string();
        assert!(rec.is_autoincrement());
        rec.auto_increment = "yes".to_string();
        assert!(!rec.is_autoincrement());
    }
}
