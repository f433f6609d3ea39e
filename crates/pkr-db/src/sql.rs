//! Statement text builders.
//!
//! Every name reaching these functions is an [`Ident`] / [`TableName`], so
//! interpolation is safe by construction. Introspection queries embed the
//! table name as a string literal for the same reason (the grammar has no
//! quote characters).

use std::fmt;

use pkr_schema::{Ident, TableName};

/// Integer column type eligible for `AUTO_INCREMENT`, as reported by
/// `information_schema.COLUMNS.COLUMN_TYPE` (e.g. `int(11) unsigned`).
///
/// Only integer types are accepted; the value is re-emitted verbatim in a
/// `MODIFY COLUMN` so the column keeps its live type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoIncrementType(String);

const INTEGER_TYPES: &[&str] = &["tinyint", "smallint", "mediumint", "int", "integer", "bigint"];
const INTEGER_ATTRS: &[&str] = &["unsigned", "zerofill"];

impl AutoIncrementType {
    pub fn parse(column_type: &str) -> Option<Self> {
        let lowered = column_type.trim().to_ascii_lowercase();
        let mut words = lowered.split_whitespace();

        let base = words.next()?;
        let (name, width) = match base.split_once('(') {
            Some((name, rest)) => (name, Some(rest.strip_suffix(')')?)),
            None => (base, None),
        };
        if !INTEGER_TYPES.contains(&name) {
            return None;
        }
        if let Some(w) = width {
            if w.is_empty() || !w.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
        }

        let mut attrs: Vec<&str> = Vec::new();
        for w in words {
            if !INTEGER_ATTRS.contains(&w) || attrs.contains(&w) {
                return None;
            }
            attrs.push(w);
        }

        let mut out = base.to_string();
        for a in attrs {
            out.push(' ');
            out.push_str(a);
        }
        Some(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AutoIncrementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn column_list(columns: &[Ident]) -> String {
    columns
        .iter()
        .map(Ident::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn drop_primary_key(table: &TableName) -> String {
    format!("ALTER TABLE {} DROP PRIMARY KEY", table.quoted())
}

pub fn add_primary_key(table: &TableName, columns: &[Ident]) -> String {
    format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({})",
        table.quoted(),
        column_list(columns)
    )
}

pub fn modify_auto_increment(table: &TableName, column: &Ident, ty: &AutoIncrementType) -> String {
    format!(
        "ALTER TABLE {} MODIFY COLUMN {} {} NOT NULL AUTO_INCREMENT",
        table.quoted(),
        column.quoted(),
        ty
    )
}

pub fn create_table_like(backup: &TableName, source: &TableName) -> String {
    format!("CREATE TABLE {} LIKE {}", backup.quoted(), source.quoted())
}

pub fn copy_all_rows(into: &TableName, from: &TableName) -> String {
    format!("INSERT INTO {} SELECT * FROM {}", into.quoted(), from.quoted())
}

pub fn truncate_table(table: &TableName) -> String {
    format!("TRUNCATE TABLE {}", table.quoted())
}

pub fn copy_columns(into: &TableName, from: &TableName, columns: &[Ident]) -> String {
    let cols = column_list(columns);
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        into.quoted(),
        cols,
        cols,
        from.quoted()
    )
}

pub fn select_base_tables() -> &'static str {
    "SELECT TABLE_NAME FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_NAME"
}

pub fn select_table_exists(table: &TableName) -> String {
    format!(
        "SELECT TABLE_NAME FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}'",
        table.as_str()
    )
}

pub fn select_primary_key(table: &TableName) -> String {
    format!(
        "SELECT COLUMN_NAME, CAST(SEQ_IN_INDEX AS CHAR) FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' AND INDEX_NAME = 'PRIMARY' \
         ORDER BY SEQ_IN_INDEX",
        table.as_str()
    )
}

pub fn select_columns(table: &TableName) -> String {
    format!(
        "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, EXTRA FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' \
         ORDER BY ORDINAL_POSITION",
        table.as_str()
    )
}
