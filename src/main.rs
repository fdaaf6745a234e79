use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autograder_server::socket::UnixSocketServer;
use autograder_server::{api, config::Config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "autograder-server starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        data_dir = %config.data_dir.display(),
        unix_socket = %config.socket.path.display(),
        "Loaded configuration"
    );

    let state = Arc::new(AppState::new(config.clone()));

    // Bind the API first so the bridge never forwards into a closed port
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Listening on: {}", config.bind_address());

    // Loopback client for the socket bridge. No timeout: a stalled API call
    // holds only its own connection.
    let http_client = reqwest::Client::builder().no_proxy().build()?;
    let socket_server = UnixSocketServer::from_state(&state, http_client);

    let (ready_tx, ready_rx) = oneshot::channel();
    let socket_exited = CancellationToken::new();
    let socket_task = {
        let server = Arc::clone(&socket_server);
        let exited = socket_exited.clone();
        tokio::spawn(async move {
            let result = server.serve(ready_tx).await;
            exited.cancel();
            result
        })
    };
    let _ = ready_rx.await;

    if !socket_server.is_listening().await {
        // Setup failed; surface the bind error instead of serving without it
        socket_task.await??;
        anyhow::bail!("Unix socket server exited during startup");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(socket_exited.cancelled_owned()))
        .await?;

    // Cleanup: release the socket path and wait for the accept loop
    info!("Shutting down the unix socket server");
    socket_server.stop().await;
    socket_task.await??;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM, or when the socket server exits on its own.
async fn shutdown_signal(socket_exited: WaitForCancellationFutureOwned) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = socket_exited => {},
    }

    info!("Shutdown signal received, draining connections");
}
