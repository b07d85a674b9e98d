//! MissionPulse data API server.
//!
//! Wires the row store, audit sink and authenticator selected by
//! configuration into the REST API, and serves until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use missionpulse_api::{
    router::{AppState, Router},
    server::Server,
};
use missionpulse_core::audit::{AuditSink, JsonlAuditSink, TableAuditSink};
use missionpulse_core::auth::{Actor, Authenticator, FixedActorAuthenticator, TokenAuthenticator};
use missionpulse_core::config::{AuditBackend, ServiceConfig, StoreBackend};
use missionpulse_core::store::{MemoryStore, PostgrestStore, RowStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the API server.
///
/// Flags override the config file and `MISSIONPULSE_*` environment variables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MISSIONPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Row store backend (memory or postgrest)
    #[arg(long)]
    store: Option<StoreBackend>,

    /// PostgREST base URL
    #[arg(long, env = "SUPABASE_URL")]
    postgrest_url: Option<String>,

    /// PostgREST service key
    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    postgrest_key: Option<String>,

    /// Audit sink backend (table or jsonl)
    #[arg(long)]
    audit: Option<AuditBackend>,

    /// JSON-lines audit file, used with `--audit jsonl`
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Disable authentication and act as this user id (development only)
    #[arg(long)]
    dev_actor: Option<String>,
}

impl Args {
    /// Applies command-line flags on top of `config`.
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        if let Some(url) = self.postgrest_url {
            config.postgrest_url = Some(url);
        }
        if let Some(key) = self.postgrest_key {
            config.postgrest_key = Some(key);
        }
        if let Some(audit) = self.audit {
            config.audit = audit;
        }
        if let Some(path) = self.audit_log {
            config.audit_log_path = Some(path);
        }
        if let Some(actor) = self.dev_actor {
            config.dev_actor = Some(actor);
        }
    }
}

fn load_config(args: Args) -> anyhow::Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn RowStore>> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory row store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgrest => {
            let url = config.postgrest_url.clone().unwrap_or_default();
            let key = config.postgrest_key.clone().unwrap_or_default();
            tracing::info!("Using PostgREST row store at {}", url);
            Ok(Arc::new(PostgrestStore::new(url, key, config.store_timeout())?))
        }
    }
}

fn build_audit(
    config: &ServiceConfig,
    store: &Arc<dyn RowStore>,
) -> anyhow::Result<Arc<dyn AuditSink>> {
    match (&config.audit, &config.audit_log_path) {
        (AuditBackend::Jsonl, Some(path)) => {
            tracing::info!("Writing audit records to {}", path.display());
            Ok(Arc::new(JsonlAuditSink::open(path)?))
        }
        (AuditBackend::Jsonl, None) => anyhow::bail!("jsonl audit requires an audit log path"),
        (AuditBackend::Table, _) => Ok(Arc::new(TableAuditSink::new(store.clone()))),
    }
}

fn build_auth(config: &ServiceConfig) -> Arc<dyn Authenticator> {
    if let Some(actor_id) = &config.dev_actor {
        return Arc::new(FixedActorAuthenticator::new(Actor::new(
            actor_id.as_str(),
            "executive",
            "internal",
        )));
    }

    let auth = config.tokens.iter().fold(TokenAuthenticator::new(), |auth, t| {
        auth.with_token(
            t.token.as_str(),
            Actor::new(t.actor_id.as_str(), t.role.as_str(), t.org_type.as_str()),
        )
    });
    if auth.is_empty() {
        tracing::warn!("No API tokens configured; every authenticated route will answer 401");
    } else {
        tracing::info!("Loaded {} API tokens", auth.len());
    }
    Arc::new(auth)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(Args::parse())?;
    let addr = config.socket_addr()?;

    let store = build_store(&config)?;
    let audit = build_audit(&config, &store)?;
    let auth = build_auth(&config);

    let state = AppState::new(store, audit, auth, config);
    let router = Router::new(state);
    let server = Server::new(addr, router);

    tracing::info!("MissionPulse API listening on http://{}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve().await {
            tracing::error!("Server error: {}", e);
        }
    });

    signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c")?;
    tracing::info!("Shutting down server...");
    server_handle.abort();

    Ok(())
}
