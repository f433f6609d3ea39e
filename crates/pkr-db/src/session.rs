//! Database boundary.
//!
//! The core never holds a process-wide handle: every inspector, backup and
//! restore call receives the session it must use. One session is one
//! connection and one transaction context; callers drive it strictly
//! sequentially.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// The server refused the statement (constraint violation, duplicate
    /// entry, unknown table, ...). This is the "repair rejected" signal.
    #[error("statement rejected: {message} [{statement}]")]
    Rejected {
        statement: String,
        code: Option<String>,
        message: String,
    },

    /// Transport / protocol failure (connection lost, TLS, pool closed).
    #[error("connection error: {0}")]
    Connection(String),

    /// A returned value could not be read as text.
    #[error("decode error: {0}")]
    Decode(String),
}

impl DbError {
    pub fn rejected(statement: &str, message: impl Into<String>) -> Self {
        DbError::Rejected {
            statement: statement.to_string(),
            code: None,
            message: message.into(),
        }
    }
}

/// One result row, every value rendered as text (`None` for SQL NULL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRow(Vec<Option<String>>);

impl SqlRow {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    /// Convenience for rows without NULLs.
    pub fn from_texts<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|v| v.as_deref())
    }

    /// Non-NULL text at `idx`, or a decode error naming the column.
    pub fn text(&self, idx: usize) -> Result<&str, DbError> {
        self.get(idx)
            .ok_or_else(|| DbError::Decode(format!("column {idx} is NULL or missing")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability object for the single connection/transaction a run owns.
///
/// Implementations must be `Send` so a session can be held across `.await`
/// points on a multi-threaded runtime; they are never shared between tasks.
#[async_trait]
pub trait SqlSession: Send {
    /// Execute a statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> Result<(), DbError>;

    /// Execute a statement and return all rows.
    async fn fetch_rows(&mut self, sql: &str) -> Result<Vec<SqlRow>, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;
}
