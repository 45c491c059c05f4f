use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_events::WebhookDelivery;
use vigil_inference::{OllamaClient, VlmInference};
use vigil_worker::config::{LogFormat, WorkerConfig};
use vigil_worker::store::PgConnector;
use vigil_worker::{health, Dispatcher, JobExecutor};

/// How long the health endpoint may take to drain after shutdown.
const HEALTH_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(
        mode = ?config.dispatch_mode,
        poll_interval_secs = config.poll_interval.as_secs(),
        ollama_host = %config.ollama_host,
        "Loaded worker configuration"
    );

    // --- Database ---
    if config.run_migrations {
        let pool = vigil_db::create_pool(&config.database_url, 1)
            .await
            .context("Failed to connect to database")?;
        vigil_db::health_check(&pool)
            .await
            .context("Database health check failed")?;
        vigil_db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        pool.close().await;
        tracing::info!("Database migrations applied");
    }

    let cancel = CancellationToken::new();

    // --- Health endpoint ---
    let health_handle = config.health_port.map(|port| {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(addr, cancel).await {
                tracing::error!(error = %e, "Health endpoint failed");
            }
        })
    });

    // --- Inference and delivery ---
    let ollama = OllamaClient::new(config.ollama_host.clone(), config.inference_timeout)
        .context("Failed to build Ollama client")?;
    let inference = Arc::new(VlmInference::new(ollama, config.vlm_config()));
    let notifier =
        Arc::new(WebhookDelivery::new(config.webhook_timeout).context("Failed to build webhook client")?);
    let executor = Arc::new(JobExecutor::new(inference, notifier));

    // --- Dispatcher ---
    let connector = Arc::new(PgConnector::new(config.database_url.clone()));
    let dispatcher = Dispatcher::new(connector, executor, config.dispatch_mode)
        .with_poll_interval(config.poll_interval);

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, finishing in-flight jobs");
        signal_cancel.cancel();
    });

    let result = dispatcher.run(cancel.clone()).await;
    cancel.cancel();

    if let Some(handle) = health_handle {
        if tokio::time::timeout(HEALTH_SHUTDOWN_TIMEOUT, handle).await.is_err() {
            tracing::warn!("Health endpoint did not stop in time");
        }
    }

    result.context("Dispatcher stopped on a fatal error")?;
    tracing::info!("Worker stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "vigil_worker=info,vigil_inference=info,vigil_events=info,tower_http=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
