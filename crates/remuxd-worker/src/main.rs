//! Remux worker binary.

use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remuxd_models::WorkerEvent;
use remuxd_worker::{AppState, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS-capable callbacks)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("remuxd=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting remuxd-worker");

    let config = WorkerConfig::from_env();
    info!(
        worker_id = %config.worker_id,
        library = %config.library_root.display(),
        "Worker config loaded"
    );

    if let Err(e) = tokio::fs::create_dir_all(config.staging_path()).await {
        error!("Failed to create staging directory: {e}");
        std::process::exit(1);
    }

    let state = match AppState::new(config.clone()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create worker state: {e}");
            std::process::exit(1);
        }
    };

    // announce ourselves so the controller can reset any stale in-flight task
    if let Some(controller) = config.controller_url.as_deref() {
        let url = format!("{}/api/webhook/worker/startup", controller.trim_end_matches('/'));
        state
            .callbacks
            .post_event(&url, &WorkerEvent::now(&config.worker_id))
            .await;
    }

    let app = remuxd_worker::routes::create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");
    info!("Listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
    }

    // best-effort shutdown notice; the controller requeues anything we held
    if let Some(controller) = config.controller_url.as_deref() {
        let url = format!(
            "{}/api/webhook/worker/shutdown",
            controller.trim_end_matches('/')
        );
        state
            .callbacks
            .post_event(&url, &WorkerEvent::now(&config.worker_id))
            .await;
    }

    info!("Worker shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
