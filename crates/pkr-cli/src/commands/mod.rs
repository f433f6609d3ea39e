//! Command handler modules for the `pkr` binary.
//!
//! Shared config/catalog resolution lives here; command-specific logic lives
//! in the submodules.

pub mod catalog;
pub mod reconcile;

use anyhow::{Context, Result};
use pkr_config::{report_unused_keys, ConfigCommand, RunSettings, UnusedKeyPolicy};
use pkr_schema::SchemaCatalog;

use crate::RunArgs;

/// Effective settings after config layers and CLI flags are combined.
pub struct Resolved {
    /// `None` when no config file was given.
    pub config_hash: Option<String>,
    pub settings: RunSettings,
}

pub fn resolve_settings(args: &RunArgs, command: ConfigCommand) -> Result<Resolved> {
    let (config_hash, mut settings) = if args.config_paths.is_empty() {
        (None, RunSettings::default())
    } else {
        let path_refs: Vec<&str> = args.config_paths.iter().map(|s| s.as_str()).collect();
        let loaded = pkr_config::load_layered_yaml(&path_refs)?;

        let policy = if args.strict_config {
            UnusedKeyPolicy::Fail
        } else {
            UnusedKeyPolicy::Warn
        };
        let report = report_unused_keys(command, &loaded.config_json, policy)?;
        if !report.is_clean() {
            eprintln!(
                "WARN: CONFIG_UNUSED_KEYS command={} unused_leaf_keys={}",
                report.command,
                report.unused_leaf_pointers.len()
            );
            for p in report.unused_leaf_pointers.iter().take(50) {
                eprintln!("  unused={}", p);
            }
        }

        let settings = RunSettings::from_config_json(&loaded.config_json)?;
        (Some(loaded.config_hash), settings)
    };

    if let Some(schema) = &args.schema {
        settings.schema_path = Some(schema.clone());
    }
    if !args.truncate.is_empty() {
        settings.truncate_allowlist = args.truncate.clone();
    }
    if !args.skip.is_empty() {
        settings.skip_tables = args.skip.clone();
    }

    Ok(Resolved {
        config_hash,
        settings,
    })
}

pub fn load_catalog(path: Option<&str>) -> Result<SchemaCatalog> {
    let path = path.context("no schema catalog: pass --schema or set /schema/path in config")?;
    let catalog = SchemaCatalog::load_json(path)
        .with_context(|| format!("failed to load schema catalog: {path}"))?;

    for (table, reason) in catalog.invalid() {
        tracing::warn!(table, "catalog entry refused: {reason}");
    }
    Ok(catalog)
}
