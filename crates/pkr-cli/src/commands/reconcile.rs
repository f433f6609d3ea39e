//! `pkr plan` and `pkr reconcile`.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;

use pkr_config::ConfigCommand;
use pkr_db::inspect;
use pkr_reconcile::{
    OutcomeKind, PlanDecision, PlanEntry, ReconciliationOutcome, ReconciliationReport, RunParams,
};
use pkr_schema::{GenerationTag, IDENT_RULE};

use super::{load_catalog, resolve_settings};
use crate::RunArgs;

/// What `--json` and `--report` emit for a run.
#[derive(Serialize)]
struct RunSummary<'a> {
    config_hash: Option<&'a str>,
    report: &'a ReconciliationReport,
}

pub async fn plan(args: RunArgs) -> Result<()> {
    let resolved = resolve_settings(&args, ConfigCommand::Plan)?;
    let catalog = load_catalog(resolved.settings.schema_path.as_deref())?;

    // Plan never creates backups; the tag only satisfies RunParams.
    let params = run_params(GenerationTag::parse("plan")?, &resolved.settings);

    let mut db = pkr_db::connect_from_env().await?;
    let universe = inspect::table_universe(&mut db)
        .await
        .context("listing tables failed")?;
    let entries = pkr_reconcile::plan(&mut db, &catalog, &universe, &params).await;
    if let Err(e) = db.close().await {
        tracing::warn!("closing connection failed: {e}");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for e in &entries {
            println!("{}", plan_line(e));
        }
        let repairs = entries
            .iter()
            .filter(|e| matches!(e.decision, PlanDecision::NeedsRepair { .. }))
            .count();
        if entries
            .iter()
            .any(|e| matches!(e.decision, PlanDecision::InvalidCatalogEntry { .. }))
        {
            println!("note={IDENT_RULE}");
        }
        println!("tables={} needs_repair={}", entries.len(), repairs);
    }
    Ok(())
}

pub async fn reconcile(
    args: RunArgs,
    generation_tag: Option<String>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let resolved = resolve_settings(&args, ConfigCommand::Reconcile)?;
    let catalog = load_catalog(resolved.settings.schema_path.as_deref())?;

    let raw_tag = generation_tag
        .or_else(|| resolved.settings.generation_tag.clone())
        .unwrap_or_else(|| Utc::now().format("%Y%m%d").to_string());
    let tag = GenerationTag::parse(&raw_tag)
        .with_context(|| format!("invalid generation tag '{raw_tag}'"))?;
    let params = run_params(tag, &resolved.settings);

    let mut db = pkr_db::connect_from_env().await?;
    let universe = inspect::table_universe(&mut db)
        .await
        .context("listing tables failed")?;
    let report = pkr_reconcile::run(&mut db, &catalog, &universe, &params).await;
    if let Err(e) = db.close().await {
        tracing::warn!("closing connection failed: {e}");
    }

    let summary = RunSummary {
        config_hash: resolved.config_hash.as_deref(),
        report: &report,
    };
    if let Some(path) = &report_path {
        let body = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&report, resolved.config_hash.as_deref());
    }

    if let Some(err) = &report.final_commit_error {
        bail!("RECONCILE_COMMIT_FAILED: {err}");
    }
    if !report.failures.is_empty() {
        bail!(
            "RECONCILE_FAILED: {} table(s) failed: {}",
            report.failures.len(),
            report.failed_tables().join(", ")
        );
    }
    Ok(())
}

fn run_params(tag: GenerationTag, settings: &pkr_config::RunSettings) -> RunParams {
    RunParams::new(tag)
        .with_truncate_allowlist(settings.truncate_allowlist.iter().cloned())
        .with_skip_set(settings.skip_tables.iter().cloned())
}

fn plan_line(e: &PlanEntry) -> String {
    match &e.decision {
        PlanDecision::Skipped { reason } => {
            format!("table={} decision=skipped reason={}", e.table, reason.as_str())
        }
        PlanDecision::InvalidCatalogEntry { reason } => {
            format!("table={} decision=invalid-catalog-entry reason={}", e.table, reason)
        }
        PlanDecision::NoOp => format!("table={} decision=no-op", e.table),
        PlanDecision::NeedsRepair {
            expected_key_count,
            actual_key_count,
            fallback,
        } => format!(
            "table={} decision=needs-repair expected_keys={} actual_keys={} fallback={}",
            e.table,
            expected_key_count,
            actual_key_count,
            fallback.map(|p| p.as_str()).unwrap_or("none")
        ),
        PlanDecision::InspectionFailed { error } => {
            format!("table={} decision=inspection-failed error={}", e.table, error)
        }
    }
}

fn print_report(report: &ReconciliationReport, config_hash: Option<&str>) {
    for o in &report.outcomes {
        let mut line = format!("table={} outcome={}", o.table, o.outcome.kind().as_str());
        match &o.outcome {
            ReconciliationOutcome::RepairedViaAutoincrementRebuild { backup_table }
            | ReconciliationOutcome::RepairedViaTruncateRebuild { backup_table } => {
                line.push_str(&format!(" backup={backup_table}"));
            }
            ReconciliationOutcome::Failed { reason } => {
                line.push_str(&format!(" reason={reason}"));
            }
            ReconciliationOutcome::Skipped { reason } => {
                line.push_str(&format!(" reason={}", reason.as_str()));
            }
            ReconciliationOutcome::NoOp | ReconciliationOutcome::RepairedDirect => {}
        }
        println!("{line}");
    }

    println!("generation_tag={}", report.generation_tag);
    println!("config_hash={}", config_hash.unwrap_or("NONE"));
    println!(
        "tables={} repaired={} no_op={} skipped={} failed={}",
        report.outcomes.len(),
        report.count(OutcomeKind::RepairedDirect)
            + report.count(OutcomeKind::RepairedViaAutoincrementRebuild)
            + report.count(OutcomeKind::RepairedViaTruncateRebuild),
        report.count(OutcomeKind::NoOp),
        report.count(OutcomeKind::Skipped),
        report.count(OutcomeKind::Failed),
    );
}
