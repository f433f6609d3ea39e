use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "pkr")]
#[command(about = "Primary-key reconciliation for MySQL schemas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> run ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Schema catalog utilities (no database needed)
    Catalog {
        #[command(subcommand)]
        cmd: CatalogCmd,
    },

    /// Inspect every table and print what `reconcile` would do. Never mutates.
    Plan(RunArgs),

    /// Repair primary keys of every table in the current schema.
    Reconcile {
        #[command(flatten)]
        run: RunArgs,

        /// Backup namespace for this run (default: UTC date, YYYYMMDD)
        #[arg(long)]
        generation_tag: Option<String>,

        /// Also write the JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
}

#[derive(Subcommand)]
enum CatalogCmd {
    /// Print the expected keys per table, and refused entries
    Show {
        /// Schema catalog JSON file
        #[arg(long)]
        schema: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Flags shared by `plan` and `reconcile`. Non-empty flags override config.
#[derive(Args)]
pub struct RunArgs {
    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config_paths: Vec<String>,

    /// Schema catalog JSON file (overrides /schema/path)
    #[arg(long)]
    pub schema: Option<String>,

    /// Table whose rows may be discarded during repair (repeatable)
    #[arg(long = "truncate")]
    pub truncate: Vec<String>,

    /// Table never touched (repeatable)
    #[arg(long = "skip")]
    pub skip: Vec<String>,

    /// Fail instead of warn on unused config keys
    #[arg(long, default_value_t = false)]
    pub strict_config: bool,

    /// Print JSON instead of key=value lines
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => {
                let mut db = pkr_db::connect_from_env().await?;
                let s = pkr_db::status(&mut db).await?;
                println!(
                    "db_ok={} database={}",
                    s.ok,
                    s.database.as_deref().unwrap_or("NONE")
                );
            }
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = pkr_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Catalog { cmd } => match cmd {
            CatalogCmd::Show { schema, json } => commands::catalog::catalog_show(&schema, json)?,
        },

        Commands::Plan(run) => commands::reconcile::plan(run).await?,

        Commands::Reconcile {
            run,
            generation_tag,
            report,
        } => commands::reconcile::reconcile(run, generation_tag, report).await?,
    }

    Ok(())
}

/// Logs go to stderr so `--json` stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
