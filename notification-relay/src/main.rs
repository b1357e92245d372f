//! Notification relay - publish gateway and queue consumers in one process.
//!
//! Starts the HTTP publish gateway, then runs the relay (broker connection
//! plus one consumer loop per queue) under the recovery supervisor until
//! SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::html::FileTemplates;
use relay::mail::SmtpMailer;
use relay::web::{self, AppState};
use relay::{supervise, Config, Dispatcher, Publisher, Relay, RestartPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be populated.
    let dotenv = dotenvy::dotenv();

    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!(dotenv_loaded = dotenv.is_ok(), "relay_process_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        rabbitmq_host = %config.rabbitmq_host,
        amqp_port = config.amqp_port,
        smtp_host = %config.smtp_host,
        smtp_port = config.smtp_port,
        template_dir = %config.template_dir.display(),
        port = config.port,
        restart_delay_secs = config.restart_delay.as_secs(),
        max_restarts = ?config.max_restarts,
        "config_loaded"
    );

    let amqp_url = config.amqp_url().context("Invalid RabbitMQ settings")?;
    let mailer = SmtpMailer::from_config(&config).context("Invalid SMTP settings")?;
    let templates = FileTemplates::new(config.template_dir.clone());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(mailer), Arc::new(templates)));

    let publisher = Publisher::new();
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let metrics = web::setup_metrics_recorder().context("Failed to install metrics recorder")?;

    // The gateway comes up first and answers 503 until a session exists.
    let app = web::router(AppState::new(publisher.clone()).with_metrics(metrics));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    if !config.startup_delay.is_zero() {
        info!(delay_secs = config.startup_delay.as_secs(), "relay_startup_delay");
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(config.startup_delay) => {}
        }
    }

    let policy = RestartPolicy {
        delay: config.restart_delay,
        max_restarts: config.max_restarts,
    };
    let instance = Relay::new(amqp_url, publisher, dispatcher, shutdown.clone());

    let supervised = supervise(&policy, &shutdown, move |_| {
        let instance = instance.clone();
        async move { instance.run_once().await }
    })
    .await;

    // Stop the gateway whether we are shutting down or giving up.
    shutdown.cancel();
    server
        .await
        .context("Web server task failed")?
        .context("Server error")?;

    info!("relay_process_shutdown_complete");

    supervised
}

/// Cancel `shutdown` when a shutdown signal is received.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_process_shutting_down");
    shutdown.cancel();
}
