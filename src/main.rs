//! AO price oracle entry point.
//!
//! Loads configuration and the signing credential, initialises structured
//! logging, then either performs a single update (`--once`) or runs the
//! recurring schedule with the liveness server until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use ao_price_oracle::config::AppConfig;
use ao_price_oracle::credential::{CredentialProvider, EnvJwkProvider};
use ao_price_oracle::engine::{
    ControllerSettings, CycleOutcome, Supervisor, SupervisorConfig, UpdateController,
};
use ao_price_oracle::health::{self, HealthState};
use ao_price_oracle::price::redstone::RedstoneClient;
use ao_price_oracle::submit::ao::AoClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    // -- Configuration and credential (fatal on failure) -----------------

    let cfg = AppConfig::load_or_default("config.toml")?.with_env_overrides()?;
    cfg.validate()?;
    let process_id = cfg.process_id()?.to_string();

    let signer = EnvJwkProvider::new(&cfg.credential.jwk_env)
        .load()
        .context("Failed to initialize signer")?;

    // -- Components ------------------------------------------------------

    let prices = RedstoneClient::new(cfg.feed.clone(), cfg.request_timeout())?;
    let submitter = AoClient::new(cfg.ao.clone(), signer, cfg.request_timeout())?;

    let controller = Arc::new(UpdateController::new(
        Arc::new(prices),
        Arc::new(submitter),
        ControllerSettings {
            process_id,
            action: cfg.oracle.action.clone(),
            ack_tag: cfg.oracle.ack_tag.clone(),
        },
    ));

    let mut supervisor = Supervisor::new(
        controller,
        SupervisorConfig {
            update_interval: cfg.update_interval(),
            serialize_cycles: cfg.oracle.serialize_cycles,
            shutdown_grace: cfg.shutdown_grace(),
        },
    );

    if once {
        let report = supervisor.run_once().await;
        match &report.outcome {
            CycleOutcome::Succeeded(update) => info!(
                price = update.submitted_price,
                message_id = %update.message_id,
                acknowledged = update.acknowledged,
                "Single update complete"
            ),
            CycleOutcome::Failed { stage, .. } => {
                warn!(stage = %stage, "Single update did not complete")
            }
        }
        return Ok(());
    }

    // -- Long-running mode -----------------------------------------------

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_server = if cfg.health.enabled {
        let state = Arc::new(HealthState::new(cfg.health.service_name.clone()));
        Some(health::spawn_health_server(state, cfg.health.port, shutdown_tx.subscribe()).await?)
    } else {
        None
    };

    // Subscribe before the signal task exists so no signal can be missed.
    let supervisor_shutdown = shutdown_tx.subscribe();
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        info!(signal, "Received signal, shutting down gracefully...");
        let _ = signal_tx.send(());
    });

    info!("Oracle running. Press Ctrl+C to stop.");
    supervisor.run_until_shutdown(supervisor_shutdown).await;

    if let Some(server) = http_server {
        let _ = server.await;
    }

    info!("Price oracle shut down cleanly.");
    Ok(())
}

/// Resolve on SIGINT or (on unix) SIGTERM, returning the signal name.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ao_price_oracle=info"));

    let json_logging = std::env::var("ORACLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
