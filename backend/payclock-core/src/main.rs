// src/main.rs

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod attendance;
mod attendance_rules;
mod clock;
mod config;
mod error;
mod leave;
mod models;
mod notifier;
mod pay_calculator;
mod payroll;
mod registry;
mod routes;
mod store;

use crate::clock::ZonedClock;
use crate::config::AppConfig;
use crate::notifier::{LogNotifier, Notifier, SendGridNotifier};
use crate::routes::AppState;
use crate::store::InMemoryStore;

#[derive(Parser, Debug)]
#[command(name = "payclock", version, about = "Attendance, payroll and leave service")]
struct Cli {
    /// Overrides PAYCLOCK_SERVER_HOST
    #[arg(long)]
    host: Option<String>,

    /// Overrides PAYCLOCK_SERVER_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Extra env file loaded before the environment is read
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenv::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tz = config.timezone()?;
    info!(
        "Configuration loaded: Timezone={}, Tolerance={}m, MaxLeaveDays={}, QuotaMode={:?}",
        tz, config.clock_tolerance_minutes, config.max_leave_days, config.leave_quota_mode
    );

    let notifier: Arc<dyn Notifier> = match &config.sendgrid_api_key {
        Some(key) => Arc::new(
            SendGridNotifier::new(key.clone(), config.email_from.clone())
                .context("Failed to build SendGrid client")?,
        ),
        None => {
            warn!("PAYCLOCK_SENDGRID_API_KEY not set; emails will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::new(
        &config,
        Arc::new(InMemoryStore::new()),
        Arc::new(ZonedClock::new(tz)),
        notifier,
    );
    let app = routes::router(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .context("Failed to load TLS certificate or key")?;
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Starting server on http://{}", addr);
            axum::serve(listener, app).await.context("HTTP server failed")?;
        }
    }

    Ok(())
}
