//! Lifecycle of the Unix socket listener.
//!
//! The server owns a slot holding the live listener handle. `stop()` clears
//! the slot under a named lock before closing the listener, so the accept
//! loop can tell a deliberate shutdown from an unexpected failure.

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::bridge::Bridge;
use crate::config::SocketConfig;
use crate::lockmanager::LockManager;
use crate::AppState;

/// Named lock serializing socket teardown.
pub const STOP_LOCK: &str = "api.server.unix-socket.stop";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to create socket directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to listen on the unix socket {}: {source}", path.display())]
    Bind { path: PathBuf, source: io::Error },
    #[error("Unix socket accept failed: {0}")]
    Accept(io::Error),
    #[error("Unix socket server panicked: {0}")]
    Unhandled(String),
}

/// What `stop()` needs to close a bound listener.
#[derive(Debug)]
struct ListenerHandle {
    cancel: CancellationToken,
    path: PathBuf,
    /// Which `serve` call bound this listener.
    serve_id: u64,
}

impl ListenerHandle {
    async fn close(self) {
        self.cancel.cancel();

        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            error!(error = %e, path = %self.path.display(), "Failed to close the unix socket");
        }
    }
}

/// Unix socket endpoint that hands each connection to a [`Bridge`].
#[derive(Debug)]
pub struct UnixSocketServer {
    bridge: Arc<Bridge>,
    config: SocketConfig,
    listener: Mutex<Option<ListenerHandle>>,
    locks: Arc<LockManager>,
    next_serve_id: AtomicU64,
    #[cfg(test)]
    panic_after_bind: std::sync::atomic::AtomicBool,
}

impl UnixSocketServer {
    pub fn new(config: SocketConfig, bridge: Bridge, locks: Arc<LockManager>) -> Arc<Self> {
        Arc::new(Self {
            bridge: Arc::new(bridge),
            config,
            listener: Mutex::new(None),
            locks,
            next_serve_id: AtomicU64::new(0),
            #[cfg(test)]
            panic_after_bind: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Build a server that forwards to this process's HTTP API port.
    pub fn from_state(state: &AppState, http_client: reqwest::Client) -> Arc<Self> {
        let bridge = Bridge::new(
            state.config.web.http_port,
            Arc::clone(&state.nonces),
            http_client,
            state.config.socket.max_frame_bytes,
        );
        Self::new(state.config.socket.clone(), bridge, Arc::clone(&state.locks))
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Bind the socket and accept connections until stopped.
    ///
    /// `ready` fires right after the bind attempt, whether it succeeded or not.
    /// Returns `Ok(())` after a deliberate `stop()`. A panic anywhere in
    /// startup or the accept loop comes back as [`ServerError::Unhandled`].
    /// A listener bound by this call is always released before it returns;
    /// one bound by another call is left alone.
    pub async fn serve(self: Arc<Self>, ready: oneshot::Sender<()>) -> Result<(), ServerError> {
        let serve_id = self.next_serve_id.fetch_add(1, Ordering::Relaxed);

        let result = AssertUnwindSafe(self.run(serve_id, ready))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ServerError::Unhandled(panic_message(panic.as_ref()))));

        self.release(serve_id).await;

        result
    }

    /// Close the listener if it is live.
    ///
    /// Safe to call concurrently and repeatedly. Returns true only for the
    /// call that actually closed it.
    pub async fn stop(&self) -> bool {
        let _guard = self.locks.lock(STOP_LOCK).await;

        let Some(handle) = self.listener.lock().await.take() else {
            return false;
        };

        handle.close().await;
        debug!(path = %self.config.path.display(), "Unix socket closed");
        true
    }

    /// Like `stop()`, but only if the live listener was bound by `serve_id`.
    async fn release(&self, serve_id: u64) {
        let _guard = self.locks.lock(STOP_LOCK).await;

        let handle = {
            let mut slot = self.listener.lock().await;
            match slot.as_ref() {
                Some(handle) if handle.serve_id == serve_id => slot.take(),
                _ => None,
            }
        };

        if let Some(handle) = handle {
            handle.close().await;
            debug!(path = %self.config.path.display(), "Unix socket closed");
        }
    }

    pub async fn is_listening(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    async fn run(&self, serve_id: u64, ready: oneshot::Sender<()>) -> Result<(), ServerError> {
        let bound = self.bind(serve_id).await;
        let _ = ready.send(());

        let (listener, cancel) = bound?;

        #[cfg(test)]
        if self.panic_after_bind.load(Ordering::Relaxed) {
            panic!("accept loop setup failed");
        }

        info!(unix_socket = %self.config.path.display(), "Unix socket server started");

        self.accept_loop(listener, cancel).await
    }

    async fn bind(
        &self,
        serve_id: u64,
    ) -> Result<(UnixListener, CancellationToken), ServerError> {
        let path = &self.config.path;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ServerError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let listener = UnixListener::bind(path).map_err(|source| ServerError::Bind {
            path: path.clone(),
            source,
        })?;

        let cancel = CancellationToken::new();
        let _guard = self.locks.lock(STOP_LOCK).await;
        *self.listener.lock().await = Some(ListenerHandle {
            cancel: cancel.clone(),
            path: path.clone(),
            serve_id,
        });

        Ok((listener, cancel))
    }

    async fn accept_loop(
        &self,
        listener: UnixListener,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Unix socket server stopped");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let stream = match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => return self.accept_failed(e).await,
            };

            let bridge = Arc::clone(&self.bridge);
            tokio::spawn(async move {
                if let Err(e) = bridge.handle(stream).await {
                    error!(error = %e, "Error handling the unix socket connection");
                }
            });
        }
    }

    /// Classify an accept error: graceful if `stop()` already cleared the slot.
    async fn accept_failed(&self, e: io::Error) -> Result<(), ServerError> {
        info!("Unix socket server stopped");

        if self.listener.lock().await.is_none() {
            return Ok(());
        }

        error!(error = %e, "Unix socket server returned an error");
        Err(ServerError::Accept(e))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
