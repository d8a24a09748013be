//! Remote power-management agent.
//!
//! A small HTTPS service that exposes host power actions (shutdown,
//! restart, sleep, ...) to authenticated remote callers.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                POWER AGENT                    │
//!                        │                                               │
//!   HTTPS request        │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!   ─────────────────────┼─▶│   net   │──▶│   http   │──▶│ dispatch  │  │
//!                        │  │ TLS/mTLS│   │ router + │   │ ack, then │  │
//!                        │  │ listener│   │  guards  │   │  execute  │  │
//!                        │  └─────────┘   └──────────┘   └─────┬─────┘  │
//!                        │                                     │        │
//!                        │                                     ▼        │
//!   200 "executing"      │                              ┌───────────┐   │
//!   ◀────────────────────┼──────────────────────────────│ platform  │   │
//!                        │                              │ executor  │   │
//!                        │                              └───────────┘   │
//!                        │                                               │
//!                        │  ┌─────────────────────────────────────────┐ │
//!                        │  │          Cross-Cutting Concerns          │ │
//!                        │  │  ┌────────┐ ┌──────────┐ ┌────────────┐ │ │
//!                        │  │  │ config │ │ security │ │ lifecycle  │ │ │
//!                        │  │  │        │ │ auth/acl/│ │ signals,   │ │ │
//!                        │  │  │        │ │ ratelimit│ │ drain      │ │ │
//!                        │  │  └────────┘ └──────────┘ └────────────┘ │ │
//!                        │  └─────────────────────────────────────────┘ │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use powerd::config::loader::{finalize, load_config};
use powerd::config::schema::{AgentConfig, ClientAuthMode};
use powerd::http::{HttpServer, ServeOutcome};
use powerd::lifecycle::install::{install_service, remove_service};
use powerd::lifecycle::signals::spawn_signal_source;
use powerd::lifecycle::{LifecycleManager, LifecycleMode, Shutdown};
use powerd::net::build_server_config;
use powerd::platform::{system_executor, system_stats_provider};
use powerd::security::Allowlist;

#[derive(Parser, Debug)]
#[command(name = "powerd", about = "Remote power management over HTTPS", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address (host:port).
    #[arg(long)]
    addr: Option<String>,

    /// Override the server certificate path (PEM).
    #[arg(long)]
    cert: Option<String>,

    /// Override the server private key path (PEM).
    #[arg(long)]
    key: Option<String>,

    /// Override the client CA bundle path; enables mTLS verification.
    #[arg(long)]
    ca: Option<String>,

    /// Comma-separated CIDR allowlist, e.g. "192.168.1.0/24,10.0.0.0/8".
    #[arg(long, value_delimiter = ',')]
    allow: Option<Vec<String>>,

    /// Override the bearer token.
    #[arg(long)]
    token: Option<String>,

    /// Log power actions without executing them.
    #[arg(long)]
    dry_run: bool,

    /// Run as a supervised service (report readiness to the supervisor).
    #[arg(long)]
    service: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install and start the agent as a system service.
    Install {
        /// Flags passed through to the service invocation.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Stop and remove the system service.
    Remove,
}

fn apply_overrides(config: &mut AgentConfig, cli: &Cli) {
    if let Some(addr) = &cli.addr {
        config.listener.bind_address = addr.clone();
    }
    if let Some(cert) = &cli.cert {
        config.listener.tls.cert_path = cert.clone();
    }
    if let Some(key) = &cli.key {
        config.listener.tls.key_path = key.clone();
    }
    if let Some(ca) = &cli.ca {
        config.listener.tls.client_ca_path = Some(ca.clone());
    }
    if let Some(allow) = &cli.allow {
        config.allowlist = allow.clone();
    }
    if let Some(token) = &cli.token {
        config.auth.bearer_token = token.clone();
    }
    if cli.dry_run {
        config.dispatch.dry_run = true;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::Install { args }) => {
            install_service(args)?;
            return Ok(());
        }
        Some(Command::Remove) => {
            remove_service()?;
            return Ok(());
        }
        None => {}
    }

    // Pin the process-wide TLS crypto provider before any rustls use.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mode = LifecycleMode::detect(cli.service);
    powerd::observability::init(mode);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?mode, "powerd starting");

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    let config = match finalize(config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration rejected");
            return Err(e.into());
        }
    };

    if config.listener.tls.client_auth == ClientAuthMode::Disabled {
        tracing::warn!("client certificates disabled, relying on bearer token only");
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        client_auth = ?config.listener.tls.client_auth,
        allowlist_ranges = config.allowlist.len(),
        dry_run = config.dispatch.dry_run,
        "configuration loaded"
    );

    let tls_config = build_server_config(&config.listener.tls)?;
    let allowlist = Allowlist::parse(&config.allowlist)?;

    let server = HttpServer::new(
        &config,
        tls_config,
        allowlist,
        system_executor(),
        system_stats_provider(),
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let (manager, _state_rx) = LifecycleManager::new(mode, shutdown.clone());
    let (control_tx, control_rx) = mpsc::channel(8);
    spawn_signal_source(control_tx);

    let outcome = manager
        .run(server.run(listener, shutdown), control_rx)
        .await?;
    if outcome == ServeOutcome::Forced {
        tracing::warn!("exited with connections force-closed");
    }
    Ok(())
}
