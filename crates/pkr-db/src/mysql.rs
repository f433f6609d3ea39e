//! MySQL implementation of [`SqlSession`] over a single `sqlx` connection.
//!
//! The session runs with `autocommit = 0`, so `commit`/`rollback` delimit
//! transactions the way the reconciler expects. DDL still commits implicitly
//! on the server; that is why backups commit before anything destructive.
//!
//! Statements go over the text protocol (`&str` executes without arguments):
//! several DDL forms cannot be prepared on older servers.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Connection, Executor, Row};
use tracing::debug;

use crate::session::{DbError, SqlRow, SqlSession};

pub struct MySqlSession {
    conn: MySqlConnection,
}

impl MySqlSession {
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let mut conn = MySqlConnection::connect(url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let init = "SET autocommit = 0";
        conn.execute(init)
            .await
            .map_err(|e| map_sqlx_error(init, e))?;

        Ok(Self { conn })
    }

    /// Graceful shutdown. Uncommitted work is rolled back by the server.
    pub async fn close(self) -> Result<(), DbError> {
        self.conn
            .close()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

#[async_trait]
impl SqlSession for MySqlSession {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        debug!(sql, "execute");
        self.conn
            .execute(sql)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(sql, e))
    }

    async fn fetch_rows(&mut self, sql: &str) -> Result<Vec<SqlRow>, DbError> {
        debug!(sql, "fetch");
        let rows = self
            .conn
            .fetch_all(sql)
            .await
            .map_err(|e| map_sqlx_error(sql, e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.execute("ROLLBACK").await
    }
}

fn map_sqlx_error(sql: &str, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db_err) => DbError::Rejected {
            statement: sql.to_string(),
            code: db_err.code().map(|c| c.into_owned()),
            message: db_err.message().to_string(),
        },
        other => DbError::Connection(other.to_string()),
    }
}

/// Render each value as text. Introspection columns are character data or
/// integers; anything else is a decode error.
fn decode_row(row: &MySqlRow) -> Result<SqlRow, DbError> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let v = if let Ok(s) = row.try_get::<Option<String>, _>(idx) {
            s
        } else if let Ok(n) = row.try_get::<Option<i64>, _>(idx) {
            n.map(|n| n.to_string())
        } else if let Ok(n) = row.try_get::<Option<u64>, _>(idx) {
            n.map(|n| n.to_string())
        } else if let Ok(b) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            b.map(|b| String::from_utf8_lossy(&b).into_owned())
        } else {
            return Err(DbError::Decode(format!("column {idx} is not text or integer")));
        };
        values.push(v);
    }
    Ok(SqlRow::new(values))
}
