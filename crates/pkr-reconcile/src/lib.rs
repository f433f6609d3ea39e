//! pkr-reconcile
//!
//! Primary-key reconciliation: compare each live table's primary key with
//! the catalog, repair in place, and fall back to backup → truncate →
//! reapply (→ restore) when the server rejects the direct repair.
//!
//! Safety rules:
//! - A table is never truncated without a committed full-copy backup first
//!   (enforced by `pkr_db::BackupReceipt`).
//! - A table matching neither recovery path is failed without mutation.
//! - One table's failure never aborts the run.
//!
//! Strictly sequential: one session, one table at a time.

mod coordinator;
mod engine;
mod types;

pub use coordinator::{plan, run, PlanDecision, PlanEntry};
pub use engine::{needs_repair, reconcile_table, recovery_path};
pub use types::*;
