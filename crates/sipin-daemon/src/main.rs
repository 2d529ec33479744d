//! sipin-daemon entry point.
//!
//! This file stays thin: it loads config and secrets, builds the store and
//! the archive client, starts the poller, and serves HTTP until a signal
//! arrives. Route handlers live in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sipin_config::{secrets, UnusedKeyPolicy};
use sipin_daemon::{routes, state, tasks};
use sipin_db::{PgStateStore, StateStore, TableName};
use sipin_mam::{MediaHavenClient, RecordSource, RopcGrant};
use sipin_reconcile::{shutdown_channel, EventHandler, MamReconciler, ShutdownTrigger};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Comma-separated list of YAML layers, merged in order.
const ENV_CONFIG_PATHS: &str = "SIPIN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/sipin.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths_from_env();
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = sipin_config::load_layered_yaml(&path_refs)?;
    let unused = sipin_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config contains unused keys");
    }
    let cfg = loaded.app_config()?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    let resolved = secrets::resolve_secrets(&cfg)?;

    let table = TableName::parse(&cfg.db.table)?;
    let pool = sipin_db::connect(&resolved.database_url, cfg.db.max_connections).await?;
    let status = sipin_db::status(&pool, &table).await?;
    if !status.has_table {
        anyhow::bail!(
            "table {} does not exist; run `sipin-cli db migrate --yes --config <same layers>` first",
            table.quoted()
        );
    }
    let store: Arc<dyn StateStore> = Arc::new(PgStateStore::new(pool, table));

    let creds = resolved.mediahaven;
    let source: Arc<dyn RecordSource> = Arc::new(MediaHavenClient::new(
        cfg.mediahaven.url.clone(),
        RopcGrant {
            client_id: creds.client_id,
            client_secret: creds.client_secret,
            username: creds.username,
            password: creds.password,
        },
        cfg.mediahaven.page_size,
    ));

    let shared = Arc::new(state::AppState::new(
        EventHandler::new(Arc::clone(&store)),
        cfg.poller.enabled,
        cfg.poller.interval_secs,
    ));

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(wait_for_signal(trigger));

    let poller = if cfg.poller.enabled {
        Some(tasks::spawn_poller(
            Arc::clone(&shared),
            MamReconciler::new(store, source),
            Duration::from_secs(cfg.poller.interval_secs),
            shutdown.clone(),
        ))
    } else {
        info!("poller disabled by config");
        None
    };

    // Pipeline events arrive over POST /v1/events; no bus adapter is wired here.
    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr: SocketAddr = cfg
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid http.bind address '{}'", cfg.http.bind))?;
    info!("sipin-daemon listening on http://{}", addr);

    let mut server_shutdown = shutdown.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await
        .context("server crashed")?;

    if let Some(handle) = poller {
        let cycles = handle.await.context("poller task panicked")?;
        info!(cycles, "poller task joined");
    }

    info!("sipin-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn config_paths_from_env() -> Vec<String> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => vec![DEFAULT_CONFIG_PATH.to_string()],
    }
}

/// Trigger shutdown on Ctrl-C or, on unix, SIGTERM.
async fn wait_for_signal(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
    trigger.trigger();
}
