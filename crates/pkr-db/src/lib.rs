//! pkr-db
//!
//! Everything that talks to the database:
//! - [`SqlSession`]: the capability object (execute / fetch / commit / rollback)
//! - [`MySqlSession`]: the production implementation on `sqlx`
//! - [`inspect`]: Live Schema Inspector
//! - [`backup`]: Backup Manager (backup + receipt-gated truncate)
//! - [`restore`]: Restore Projector
//! - [`sql`]: statement text builders

use anyhow::{Context, Result};

pub mod backup;
pub mod inspect;
pub mod mysql;
pub mod restore;
pub mod session;
pub mod sql;

pub use backup::{backup, truncate, BackupError, BackupReceipt, TruncateError};
pub use inspect::{ColumnInfo, InspectionError, KeyColumnDescriptor};
pub use mysql::MySqlSession;
pub use restore::{restore_columns, restore_excluding, restore_projected, RestoreError};
pub use session::{DbError, SqlRow, SqlSession};

pub const ENV_DB_URL: &str = "PKR_DATABASE_URL";

/// Open the run's single session from PKR_DATABASE_URL.
pub async fn connect_from_env() -> Result<MySqlSession> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    MySqlSession::connect(&url)
        .await
        .context("failed to connect to MySQL")
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    /// `DATABASE()`; `None` when the URL selects no schema.
    pub database: Option<String>,
}

/// Simple status query (connectivity + selected schema).
pub async fn status(db: &mut dyn SqlSession) -> Result<DbStatus> {
    let rows = db
        .fetch_rows("SELECT 1, DATABASE()")
        .await
        .context("status connectivity query failed")?;

    let row = rows.first().context("status query returned no row")?;
    Ok(DbStatus {
        ok: row.get(0) == Some("1"),
        database: row.get(1).map(str::to_string),
    })
}
