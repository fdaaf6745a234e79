//! autograder-server - the autograder HTTP API plus its local root bridge
//!
//! This crate provides:
//! - A JSend HTTP API whose requests carry JSON content in a form field
//! - A Unix socket bridge that relays local requests to the API as root
//! - Single-use root nonces minted per bridged request
//! - Named locks used to serialize socket teardown

pub mod api;
pub mod config;
pub mod lockmanager;
pub mod socket;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use config::Config;
use lockmanager::LockManager;
use tokens::NonceRegistry;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub locks: Arc<LockManager>,
    pub nonces: Arc<NonceRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let nonces = Arc::new(NonceRegistry::new(config.socket.nonce_size_bytes));
        Self {
            config,
            locks: Arc::new(LockManager::new()),
            nonces,
        }
    }
}
