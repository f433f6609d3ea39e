//! Run Coordinator: the outer loop around the engine.
//!
//! Tables are processed one at a time in universe order. Every error is
//! caught at the table boundary and turned into a report entry; nothing one
//! table does can stop the next one from being attempted.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use pkr_db::{inspect, SqlSession};
use pkr_schema::{CatalogLookup, SchemaCatalog};

use crate::engine;
use crate::types::{
    ReconciliationOutcome, ReconciliationReport, RecoveryPath, RepairError, RunParams, SkipReason,
    TableFailure, TableOutcome,
};

pub async fn run(
    db: &mut dyn SqlSession,
    catalog: &SchemaCatalog,
    table_universe: &[String],
    params: &RunParams,
) -> ReconciliationReport {
    let started_at_utc = Utc::now();
    let mut outcomes: Vec<TableOutcome> = Vec::with_capacity(table_universe.len());
    let mut failures: Vec<TableFailure> = Vec::new();

    info!(
        tables = table_universe.len(),
        generation_tag = %params.generation_tag,
        "reconciliation run started"
    );

    for raw in table_universe {
        let entry = reconcile_one(db, catalog, raw, params).await;
        if let ReconciliationOutcome::Failed { reason } = &entry.outcome {
            failures.push(TableFailure {
                table: raw.clone(),
                error: reason.clone(),
            });
        }
        outcomes.push(entry);
    }

    let final_commit_error = match db.commit().await {
        Ok(()) => None,
        Err(e) => {
            error!("final commit failed: {e}");
            Some(e.to_string())
        }
    };

    let report = ReconciliationReport {
        generation_tag: params.generation_tag.clone(),
        started_at_utc,
        finished_at_utc: Utc::now(),
        outcomes,
        failures,
        final_commit_error,
    };

    info!(
        tables = report.outcomes.len(),
        failed = report.failures.len(),
        "reconciliation run finished"
    );
    report
}

async fn reconcile_one(
    db: &mut dyn SqlSession,
    catalog: &SchemaCatalog,
    raw: &str,
    params: &RunParams,
) -> TableOutcome {
    let mut entry = TableOutcome {
        table: raw.to_string(),
        outcome: ReconciliationOutcome::NoOp,
        expected_key_count: None,
        actual_key_count: None,
        verified_keys: None,
    };

    if params.skip_set.contains(raw) {
        entry.outcome = ReconciliationOutcome::Skipped {
            reason: SkipReason::SkipList,
        };
        return entry;
    }

    let (table, expected) = match catalog.lookup(raw) {
        CatalogLookup::Expected(table, expected) => (table, expected),
        CatalogLookup::Absent => {
            entry.outcome = ReconciliationOutcome::Skipped {
                reason: SkipReason::NotInCatalog,
            };
            return entry;
        }
        CatalogLookup::Invalid(reason) => {
            let err = RepairError::Identifier {
                table: raw.to_string(),
                reason: reason.to_string(),
            };
            error!(table = raw, "something went wrong while updating: {err}");
            entry.outcome = ReconciliationOutcome::Failed {
                reason: err.to_string(),
            };
            return entry;
        }
    };
    entry.expected_key_count = Some(expected.len());

    let result = match inspect::actual_keys(db, table).await {
        Ok(actual) => {
            entry.actual_key_count = Some(actual.len());
            engine::reconcile_table(db, table, expected, &actual, params).await
        }
        Err(e) => Err(RepairError::from(e)),
    };

    match result {
        Ok(repair) => {
            if repair.outcome.is_repaired() {
                info!(table = raw, outcome = repair.outcome.kind().as_str(), "successfully updated");
            }
            entry.outcome = repair.outcome;
            entry.verified_keys = repair.verified_keys;
        }
        Err(err) => {
            error!(table = raw, "something went wrong while updating: {err}");
            entry.outcome = ReconciliationOutcome::Failed {
                reason: err.to_string(),
            };
        }
    }
    entry
}

/// Decision the engine would take for one table, without mutating anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlanDecision {
    Skipped {
        reason: SkipReason,
    },
    InvalidCatalogEntry {
        reason: String,
    },
    NoOp,
    NeedsRepair {
        expected_key_count: usize,
        actual_key_count: usize,
        /// Where a rejected direct repair would go; `None` means it would fail.
        fallback: Option<RecoveryPath>,
    },
    InspectionFailed {
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub table: String,
    pub decision: PlanDecision,
}

/// Inspection-only dry run over the same universe and parameters as [`run`].
pub async fn plan(
    db: &mut dyn SqlSession,
    catalog: &SchemaCatalog,
    table_universe: &[String],
    params: &RunParams,
) -> Vec<PlanEntry> {
    let mut entries = Vec::with_capacity(table_universe.len());

    for raw in table_universe {
        let decision = if params.skip_set.contains(raw) {
            PlanDecision::Skipped {
                reason: SkipReason::SkipList,
            }
        } else {
            match catalog.lookup(raw) {
                CatalogLookup::Absent => PlanDecision::Skipped {
                    reason: SkipReason::NotInCatalog,
                },
                CatalogLookup::Invalid(reason) => PlanDecision::InvalidCatalogEntry {
                    reason: reason.to_string(),
                },
                CatalogLookup::Expected(table, expected) => {
                    match inspect::actual_keys(db, table).await {
                        Ok(actual) if !engine::needs_repair(expected, &actual) => PlanDecision::NoOp,
                        Ok(actual) => PlanDecision::NeedsRepair {
                            expected_key_count: expected.len(),
                            actual_key_count: actual.len(),
                            fallback: engine::recovery_path(table, expected, params),
                        },
                        Err(e) => {
                            warn!(table = raw.as_str(), "inspection failed: {e}");
                            PlanDecision::InspectionFailed {
                                error: e.to_string(),
                            }
                        }
                    }
                }
            }
        };

        entries.push(PlanEntry {
            table: raw.clone(),
            decision,
        });
    }
    entries
}
