use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use pkr_db::{DbError, SqlRow, SqlSession};

pub type FakeRow = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeColumn {
    pub name: String,
    pub column_type: String,
    pub nullable: bool,
    pub auto_increment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FakeTable {
    pub columns: Vec<FakeColumn>,
    pub primary_key: Vec<String>,
    pub rows: Vec<FakeRow>,
    next_auto: u64,
}

impl FakeTable {
    /// Columns as `(name, column_type)`; all nullable, no key, no rows.
    pub fn new(columns: &[(&str, &str)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, ty)| FakeColumn {
                    name: name.to_string(),
                    column_type: ty.to_string(),
                    nullable: true,
                    auto_increment: false,
                })
                .collect(),
            primary_key: Vec::new(),
            rows: Vec::new(),
            next_auto: 1,
        }
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        for c in &mut self.columns {
            if self.primary_key.contains(&c.name) {
                c.nullable = false;
            }
        }
        self
    }

    /// Rows without NULLs, values in column order.
    pub fn with_rows(mut self, rows: &[&[&str]]) -> Self {
        self.rows = rows
            .iter()
            .map(|r| r.iter().map(|v| Some(v.to_string())).collect())
            .collect();
        self
    }

    pub fn with_raw_rows(mut self, rows: Vec<FakeRow>) -> Self {
        self.rows = rows;
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<&FakeColumn> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Values of one column, in row order.
    pub fn values(&self, column: &str) -> Vec<Option<String>> {
        match self.column_index(column) {
            Some(i) => self.rows.iter().map(|r| r[i].clone()).collect(),
            None => Vec::new(),
        }
    }

    fn key_violation(&self, key: &[String]) -> Option<String> {
        let idx: Vec<usize> = key.iter().filter_map(|k| self.column_index(k)).collect();
        let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
        for row in &self.rows {
            let mut tuple = Vec::with_capacity(idx.len());
            for &i in &idx {
                match &row[i] {
                    Some(v) => tuple.push(v.clone()),
                    None => return Some("Invalid use of NULL value".to_string()),
                }
            }
            if !seen.insert(tuple.clone()) {
                return Some(format!(
                    "Duplicate entry '{}' for key 'PRIMARY'",
                    tuple.join("-")
                ));
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggedStatement {
    Execute(String),
    Query(String),
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    message: String,
    /// `None` = every match fails.
    remaining: Option<usize>,
}

/// In-memory MySQL stand-in. See the crate docs for the modelled behaviour.
#[derive(Debug, Clone, Default)]
pub struct FakeMySql {
    tables: BTreeMap<String, FakeTable>,
    committed: BTreeMap<String, FakeTable>,
    log: Vec<LoggedStatement>,
    rules: Vec<FailureRule>,
}

impl FakeMySql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, table: FakeTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self.committed = self.tables.clone();
        self
    }

    /// Every statement containing `needle` is rejected with `message`.
    pub fn fail_when(&mut self, needle: &str, message: &str) -> &mut Self {
        self.rules.push(FailureRule {
            needle: needle.to_string(),
            message: message.to_string(),
            remaining: None,
        });
        self
    }

    /// Only the first statement containing `needle` is rejected.
    pub fn fail_once_when(&mut self, needle: &str, message: &str) -> &mut Self {
        self.rules.push(FailureRule {
            needle: needle.to_string(),
            message: message.to_string(),
            remaining: Some(1),
        });
        self
    }

    pub fn table(&self, name: &str) -> Option<&FakeTable> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn primary_key(&self, name: &str) -> Vec<String> {
        self.tables
            .get(name)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default()
    }

    pub fn log(&self) -> &[LoggedStatement] {
        &self.log
    }

    /// Row-changing and DDL statements only, in order.
    pub fn executed(&self) -> Vec<&str> {
        self.log
            .iter()
            .filter_map(|s| match s {
                LoggedStatement::Execute(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Executed statements that mention table `name` (backtick-quoted).
    pub fn executed_for(&self, name: &str) -> Vec<&str> {
        let needle = format!("`{name}`");
        self.executed()
            .into_iter()
            .filter(|s| s.contains(&needle))
            .collect()
    }

    /// Position in the log of the first executed statement starting with `prefix`.
    pub fn position_of(&self, prefix: &str) -> Option<usize> {
        self.log
            .iter()
            .position(|s| matches!(s, LoggedStatement::Execute(sql) if sql.starts_with(prefix)))
    }

    pub fn rollback_count(&self) -> usize {
        self.log
            .iter()
            .filter(|s| matches!(s, LoggedStatement::Rollback))
            .count()
    }

    fn injected_failure(&mut self, sql: &str) -> Option<DbError> {
        for rule in &mut self.rules {
            if !sql.contains(&rule.needle) {
                continue;
            }
            match rule.remaining {
                Some(0) => continue,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            return Some(rejected(sql, &rule.message));
        }
        None
    }

    fn table_mut(&mut self, sql: &str, name: &str) -> Result<&mut FakeTable, DbError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| rejected(sql, &format!("Table '{name}' doesn't exist")))
    }

    fn apply(&mut self, sql: &str) -> Result<(), DbError> {
        let names = backticked(sql);
        let (Some(target), second) = (names.first().cloned(), names.get(1).cloned()) else {
            return Err(rejected(sql, "You have an error in your SQL syntax"));
        };
        let is_ddl = sql.starts_with("ALTER TABLE")
            || sql.starts_with("CREATE TABLE")
            || sql.starts_with("TRUNCATE TABLE");

        if sql.starts_with("ALTER TABLE") && sql.contains(" DROP PRIMARY KEY") {
            let t = self.table_mut(sql, &target)?;
            if t.primary_key.is_empty() {
                return Err(rejected(sql, "Can't DROP 'PRIMARY'; check that column/key exists"));
            }
            t.primary_key.clear();
        } else if sql.starts_with("ALTER TABLE") && sql.contains(" ADD PRIMARY KEY ") {
            let key: Vec<String> = names[1..].to_vec();
            let t = self.table_mut(sql, &target)?;
            if !t.primary_key.is_empty() {
                return Err(rejected(sql, "Multiple primary key defined"));
            }
            if let Some(missing) = key.iter().find(|k| t.column_index(k).is_none()) {
                return Err(rejected(sql, &format!("Key column '{missing}' doesn't exist in table")));
            }
            if let Some(msg) = t.key_violation(&key) {
                return Err(rejected(sql, &msg));
            }
            for c in &mut t.columns {
                if key.contains(&c.name) {
                    c.nullable = false;
                }
            }
            t.primary_key = key;
        } else if sql.starts_with("ALTER TABLE") && sql.contains(" MODIFY COLUMN ") {
            let col = second.ok_or_else(|| rejected(sql, "You have an error in your SQL syntax"))?;
            let ty = sql
                .split_once(&format!("`{col}` "))
                .and_then(|(_, rest)| rest.split_once(" NOT NULL AUTO_INCREMENT"))
                .map(|(ty, _)| ty.to_string())
                .ok_or_else(|| rejected(sql, "You have an error in your SQL syntax"))?;
            let t = self.table_mut(sql, &target)?;
            let i = t
                .column_index(&col)
                .ok_or_else(|| rejected(sql, &format!("Unknown column '{col}'")))?;
            if !t.primary_key.iter().any(|k| k.eq_ignore_ascii_case(&col)) {
                return Err(rejected(
                    sql,
                    "Incorrect table definition; there can be only one auto column and it must be defined as a key",
                ));
            }
            if t.rows.iter().any(|r| r[i].is_none()) {
                return Err(rejected(sql, "Invalid use of NULL value"));
            }
            let max = t
                .rows
                .iter()
                .filter_map(|r| r[i].as_deref().and_then(|v| v.parse::<u64>().ok()))
                .max()
                .unwrap_or(0);
            t.next_auto = t.next_auto.max(max + 1);
            let c = &mut t.columns[i];
            c.column_type = ty;
            c.nullable = false;
            c.auto_increment = true;
        } else if sql.starts_with("CREATE TABLE") && sql.contains(" LIKE ") {
            let source = second.ok_or_else(|| rejected(sql, "You have an error in your SQL syntax"))?;
            let backup = target;
            if self.tables.contains_key(&backup) {
                return Err(rejected(sql, &format!("Table '{backup}' already exists")));
            }
            let src = self.table_mut(sql, &source)?;
            let clone = FakeTable {
                columns: src.columns.clone(),
                primary_key: src.primary_key.clone(),
                rows: Vec::new(),
                next_auto: 1,
            };
            self.tables.insert(backup, clone);
        } else if sql.starts_with("TRUNCATE TABLE") {
            let t = self.table_mut(sql, &target)?;
            t.rows.clear();
            t.next_auto = 1;
        } else if sql.starts_with("INSERT INTO") {
            self.insert_select(sql)?;
        } else {
            return Err(rejected(sql, "statement not modelled by FakeMySql"));
        }

        if is_ddl {
            self.committed = self.tables.clone();
        }
        Ok(())
    }

    fn insert_select(&mut self, sql: &str) -> Result<(), DbError> {
        let (head, select) = sql
            .split_once(" SELECT ")
            .ok_or_else(|| rejected(sql, "You have an error in your SQL syntax"))?;
        let into_names = backticked(head);
        let select_names = backticked(select);
        let into = into_names
            .first()
            .cloned()
            .ok_or_else(|| rejected(sql, "You have an error in your SQL syntax"))?;
        let from = select_names
            .last()
            .cloned()
            .ok_or_else(|| rejected(sql, "You have an error in your SQL syntax"))?;
        let into_cols = &into_names[1..];
        let select_cols = &select_names[..select_names.len() - 1];

        if into_cols != select_cols {
            return Err(rejected(sql, "Column count doesn't match value count"));
        }

        let src = self
            .tables
            .get(&from)
            .ok_or_else(|| rejected(sql, &format!("Table '{from}' doesn't exist")))?
            .clone();
        let dst = self.table_mut(sql, &into)?;

        let mut appended: Vec<FakeRow> = Vec::with_capacity(src.rows.len());
        if into_cols.is_empty() {
            // INSERT INTO a SELECT * FROM b: positional.
            if src.columns.len() != dst.columns.len() {
                return Err(rejected(sql, "Column count doesn't match value count"));
            }
            appended.extend(src.rows.iter().cloned());
        } else {
            let mut mapping = Vec::with_capacity(into_cols.len());
            for c in into_cols {
                let d = dst
                    .column_index(c)
                    .ok_or_else(|| rejected(sql, &format!("Unknown column '{c}' in 'field list'")))?;
                let s = src
                    .column_index(c)
                    .ok_or_else(|| rejected(sql, &format!("Unknown column '{c}' in 'field list'")))?;
                mapping.push((d, s));
            }
            for row in &src.rows {
                let mut out: FakeRow = vec![None; dst.columns.len()];
                for &(d, s) in &mapping {
                    out[d] = row[s].clone();
                }
                for (i, col) in dst.columns.iter().enumerate() {
                    if col.auto_increment && out[i].is_none() {
                        out[i] = Some(dst.next_auto.to_string());
                        dst.next_auto += 1;
                    }
                }
                appended.push(out);
            }
        }

        let before = dst.rows.len();
        dst.rows.extend(appended);
        if !dst.primary_key.is_empty() {
            let key = dst.primary_key.clone();
            if let Some(msg) = dst.key_violation(&key) {
                dst.rows.truncate(before);
                return Err(rejected(sql, &msg));
            }
        }
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<Vec<SqlRow>, DbError> {
        if sql.starts_with("SELECT 1, DATABASE()") {
            return Ok(vec![SqlRow::from_texts(["1", "fake"])]);
        }
        if sql.contains("information_schema.TABLES") && sql.contains("TABLE_TYPE = 'BASE TABLE'") {
            return Ok(self
                .tables
                .keys()
                .map(|t| SqlRow::from_texts([t.as_str()]))
                .collect());
        }

        let name = quoted_table_name(sql)
            .ok_or_else(|| rejected(sql, "query not modelled by FakeMySql"))?;

        if sql.contains("information_schema.TABLES") {
            return Ok(if self.tables.contains_key(&name) {
                vec![SqlRow::from_texts([name.as_str()])]
            } else {
                Vec::new()
            });
        }
        let table = match self.tables.get(&name) {
            Some(t) => t,
            None => return Ok(Vec::new()),
        };
        if sql.contains("information_schema.STATISTICS") {
            return Ok(table
                .primary_key
                .iter()
                .enumerate()
                .map(|(i, c)| SqlRow::from_texts([c.clone(), (i + 1).to_string()]))
                .collect());
        }
        if sql.contains("information_schema.COLUMNS") {
            return Ok(table
                .columns
                .iter()
                .map(|c| {
                    SqlRow::from_texts([
                        c.name.clone(),
                        c.column_type.clone(),
                        if c.nullable { "YES" } else { "NO" }.to_string(),
                        if c.auto_increment { "auto_increment" } else { "" }.to_string(),
                    ])
                })
                .collect());
        }
        Err(rejected(sql, "query not modelled by FakeMySql"))
    }
}

#[async_trait]
impl SqlSession for FakeMySql {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.log.push(LoggedStatement::Execute(sql.to_string()));
        if let Some(e) = self.injected_failure(sql) {
            return Err(e);
        }
        self.apply(sql)
    }

    async fn fetch_rows(&mut self, sql: &str) -> Result<Vec<SqlRow>, DbError> {
        self.log.push(LoggedStatement::Query(sql.to_string()));
        if let Some(e) = self.injected_failure(sql) {
            return Err(e);
        }
        self.query(sql)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.log.push(LoggedStatement::Commit);
        if let Some(e) = self.injected_failure("COMMIT") {
            return Err(e);
        }
        self.committed = self.tables.clone();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.log.push(LoggedStatement::Rollback);
        self.tables = self.committed.clone();
        Ok(())
    }
}

fn rejected(sql: &str, message: &str) -> DbError {
    DbError::Rejected {
        statement: sql.to_string(),
        code: Some("HY000".to_string()),
        message: message.to_string(),
    }
}

/// All backtick-quoted names, in order of appearance.
fn backticked(sql: &str) -> Vec<String> {
    sql.split('`')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

/// `TABLE_NAME = '<name>'` literal of an introspection query.
fn quoted_table_name(sql: &str) -> Option<String> {
    let (_, rest) = sql.split_once("TABLE_NAME = '")?;
    let (name, _) = rest.split_once('\'')?;
    Some(name.to_string())
}
