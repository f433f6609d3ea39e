use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pkr_db::{
    BackupError, DbError, InspectionError, KeyColumnDescriptor, RestoreError, TruncateError,
};
use pkr_schema::{GenerationTag, TableName};

/// Run parameters shared by every table of one pass.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Namespaces every backup table created in this run.
    pub generation_tag: GenerationTag,
    /// Tables whose rows may be discarded without restoration.
    pub truncate_allowlist: BTreeSet<String>,
    /// Tables never touched.
    pub skip_set: BTreeSet<String>,
}

impl RunParams {
    pub fn new(generation_tag: GenerationTag) -> Self {
        Self {
            generation_tag,
            truncate_allowlist: BTreeSet::new(),
            skip_set: BTreeSet::new(),
        }
    }

    pub fn with_truncate_allowlist<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.truncate_allowlist = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skip_set<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_set = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn may_truncate(&self, table: &TableName) -> bool {
        self.truncate_allowlist.contains(table.as_str())
    }
}

/// Which fallback a rejected direct repair went down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryPath {
    AutoIncrementRebuild,
    TruncateRebuild,
}

impl RecoveryPath {
    /// Same spelling as the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPath::AutoIncrementRebuild => "auto-increment-rebuild",
            RecoveryPath::TruncateRebuild => "truncate-rebuild",
        }
    }
}

impl fmt::Display for RecoveryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPath::AutoIncrementRebuild => f.write_str("auto-increment rebuild"),
            RecoveryPath::TruncateRebuild => f.write_str("truncate rebuild"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Listed in the run's skip set.
    SkipList,
    /// Present in the database, absent from (or keyless in) the catalog.
    NotInCatalog,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SkipList => "skip-list",
            SkipReason::NotInCatalog => "not-in-catalog",
        }
    }
}

/// Terminal state of one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReconciliationOutcome {
    Skipped { reason: SkipReason },
    /// Expected and actual key counts already match.
    NoOp,
    RepairedDirect,
    RepairedViaAutoincrementRebuild { backup_table: TableName },
    RepairedViaTruncateRebuild { backup_table: TableName },
    Failed { reason: String },
}

impl ReconciliationOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ReconciliationOutcome::Skipped { .. } => OutcomeKind::Skipped,
            ReconciliationOutcome::NoOp => OutcomeKind::NoOp,
            ReconciliationOutcome::RepairedDirect => OutcomeKind::RepairedDirect,
            ReconciliationOutcome::RepairedViaAutoincrementRebuild { .. } => {
                OutcomeKind::RepairedViaAutoincrementRebuild
            }
            ReconciliationOutcome::RepairedViaTruncateRebuild { .. } => {
                OutcomeKind::RepairedViaTruncateRebuild
            }
            ReconciliationOutcome::Failed { .. } => OutcomeKind::Failed,
        }
    }

    pub fn is_repaired(&self) -> bool {
        matches!(
            self,
            ReconciliationOutcome::RepairedDirect
                | ReconciliationOutcome::RepairedViaAutoincrementRebuild { .. }
                | ReconciliationOutcome::RepairedViaTruncateRebuild { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ReconciliationOutcome::Failed { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Skipped,
    NoOp,
    RepairedDirect,
    RepairedViaAutoincrementRebuild,
    RepairedViaTruncateRebuild,
    Failed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::NoOp => "no-op",
            OutcomeKind::RepairedDirect => "repaired-direct",
            OutcomeKind::RepairedViaAutoincrementRebuild => "repaired-via-autoincrement-rebuild",
            OutcomeKind::RepairedViaTruncateRebuild => "repaired-via-truncate-rebuild",
            OutcomeKind::Failed => "failed",
        }
    }
}

/// What the engine hands back for a table it did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRepair {
    pub outcome: ReconciliationOutcome,
    /// Post-repair key definition (audit only). `None` for no-op, or when the
    /// verification query itself failed.
    pub verified_keys: Option<Vec<KeyColumnDescriptor>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub outcome: ReconciliationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_key_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_key_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_keys: Option<Vec<KeyColumnDescriptor>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Final accounting of one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub generation_tag: GenerationTag,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    /// Every table of the universe, in processing order.
    pub outcomes: Vec<TableOutcome>,
    pub failures: Vec<TableFailure>,
    /// Set when the end-of-run commit was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_commit_error: Option<String>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.final_commit_error.is_none()
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.kind() == kind)
            .count()
    }

    pub fn outcome_for(&self, table: &str) -> Option<&ReconciliationOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.table == table)
            .map(|o| &o.outcome)
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.table.as_str()).collect()
    }
}

/// A step inside a fallback path failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Truncate(#[from] TruncateError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Inspection(#[from] InspectionError),

    #[error("statement rejected during rebuild: {0}")]
    Statement(#[source] DbError),
}

/// Why a table ended in `failed`. Caught per table by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    #[error("unsafe identifier in catalog entry for {table}: {reason}")]
    Identifier { table: String, reason: String },

    #[error(transparent)]
    Inspection(#[from] InspectionError),

    /// Direct repair rejected and no recovery path applies.
    #[error("primary key repair rejected for {table}: {source}")]
    Rejected {
        table: String,
        #[source]
        source: DbError,
    },

    /// Direct repair rejected, recovery attempted and failed.
    #[error("{path} of {table} failed: {source}; direct repair had failed with: {direct}")]
    FallbackFailed {
        table: String,
        path: RecoveryPath,
        direct: DbError,
        #[source]
        source: FallbackError,
    },
}
