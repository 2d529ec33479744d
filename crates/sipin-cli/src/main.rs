use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use sipin_config::{secrets, AppConfig, LoadedConfig, UnusedKeyPolicy};
use sipin_db::{PgStateStore, TableName, DEFAULT_TABLE};
use sipin_mam::{MediaHavenClient, RopcGrant};
use sipin_reconcile::MamReconciler;
use sipin_schemas::SipStatus;

#[derive(Parser)]
#[command(name = "sipin")]
#[command(about = "SIP ingest state operator CLI", long_about = None)]
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
        /// Paths in merge order (base -> env -> site...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run exactly one archive poll cycle and print its report as JSON
    PollOnce {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// List pids of rows still in progress
    Pending {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Print one ingest row as JSON
    Show {
        /// Correlation id of the row
        correlation_id: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status {
        #[command(flatten)]
        target: DbTarget,
    },

    /// Apply SQL migrations. Guardrail: refuses when rows are still in progress unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with ingests in flight.
        #[arg(long, default_value_t = false)]
        yes: bool,

        #[command(flatten)]
        target: DbTarget,
    },
}

/// Which database and table a `db` command acts on.
///
/// With `--config`, the URL comes from the env var named by `db.url_env` and
/// the table from `db.table`; otherwise SIPIN_DATABASE_URL and the default
/// table. `--table` overrides either.
#[derive(clap::Args)]
struct DbTarget {
    /// Layered config paths in merge order
    #[arg(long = "config")]
    config_paths: Vec<String>,

    /// Ingest table, optionally schema-qualified
    #[arg(long)]
    table: Option<String>,
}

impl DbTarget {
    fn resolve(&self) -> Result<(String, TableName)> {
        let (url, table) = if self.config_paths.is_empty() {
            let url = std::env::var(sipin_db::ENV_DB_URL)
                .with_context(|| format!("missing env var {}", sipin_db::ENV_DB_URL))?;
            (url, DEFAULT_TABLE.to_string())
        } else {
            let cfg = load_config(&self.config_paths)?.app_config()?;
            (database_url(&cfg)?, cfg.db.table)
        };
        let table = TableName::parse(self.table.as_deref().unwrap_or(&table))?;
        Ok((url, table))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status { target } => {
                let (url, table) = target.resolve()?;
                let pool = sipin_db::connect(&url, 2).await?;
                let s = sipin_db::status(&pool, &table).await?;
                println!("db_ok={} has_table={} table={}", s.ok, s.has_table, table);
                if s.has_table {
                    let store = PgStateStore::new(pool, table);
                    for st in [SipStatus::InProgress, SipStatus::Success, SipStatus::Failure] {
                        let n = store.count_by_status(st).await?;
                        println!("rows_{}={}", st.as_str(), n);
                    }
                }
            }
            DbCmd::Migrate { yes, target } => {
                let (url, table) = target.resolve()?;
                let pool = sipin_db::connect(&url, 2).await?;

                // Guardrail: migrating under in-flight ingests needs an explicit ack.
                let s = sipin_db::status(&pool, &table).await?;
                if s.has_table {
                    let store = PgStateStore::new(pool.clone(), table.clone());
                    let n = store.count_by_status(SipStatus::InProgress).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} row(s) still in_progress. Re-run with: `sipin-cli db migrate --yes`",
                            n
                        );
                    }
                }

                let applied = sipin_db::migrate_for(&pool, &table).await?;
                println!("migrations_applied={} table={}", applied, table);
            }
        },

        Commands::ConfigHash { paths } => {
            let loaded = load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::PollOnce { config_paths } => {
            let loaded = load_config(&config_paths)?;
            let cfg = loaded.app_config()?;
            let resolved = secrets::resolve_secrets(&cfg)?;

            let store = open_store(&cfg, &resolved.database_url).await?;
            let creds = resolved.mediahaven;
            let client = MediaHavenClient::new(
                cfg.mediahaven.url.clone(),
                RopcGrant {
                    client_id: creds.client_id,
                    client_secret: creds.client_secret,
                    username: creds.username,
                    password: creds.password,
                },
                cfg.mediahaven.page_size,
            );

            let reconciler = MamReconciler::new(Arc::new(store), Arc::new(client));
            let report = reconciler.run_cycle(Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(err) = report.query_error {
                anyhow::bail!("archive lookup failed: {err}");
            }
        }

        Commands::Pending { config_paths } => {
            let cfg = load_config(&config_paths)?.app_config()?;
            let store = open_store(&cfg, &database_url(&cfg)?).await?;
            let pids = store.try_select_pids_in_progress().await?;
            for pid in &pids {
                println!("{pid}");
            }
            eprintln!("pending_pids={}", pids.len());
        }

        Commands::Show {
            correlation_id,
            config_paths,
        } => {
            let cfg = load_config(&config_paths)?.app_config()?;
            let store = open_store(&cfg, &database_url(&cfg)?).await?;
            let row = store
                .fetch_by_correlation_id(&correlation_id)
                .await?
                .with_context(|| format!("no row with correlation_id={correlation_id}"))?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries command output only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = sipin_config::load_layered_yaml(&path_refs)?;
    let unused = sipin_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        tracing::warn!(keys = ?unused.unused_leaf_pointers, "config contains unused keys");
    }
    Ok(loaded)
}

/// Only the database URL; commands that never reach the archive do not need
/// its credentials.
fn database_url(cfg: &AppConfig) -> Result<String> {
    std::env::var(&cfg.db.url_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| {
            format!(
                "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
                cfg.db.url_env
            )
        })
}

async fn open_store(cfg: &AppConfig, url: &str) -> Result<PgStateStore> {
    let table = TableName::parse(&cfg.db.table)?;
    let pool = sipin_db::connect(url, cfg.db.max_connections).await?;
    Ok(PgStateStore::new(pool, table))
}
