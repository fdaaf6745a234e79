//! Registry of single-use root-user nonces.
//!
//! A nonce is minted by the socket bridge for exactly one forwarded request
//! and revoked as soon as that request completes. The HTTP API treats a
//! registered nonce as proof that the request came through the local socket.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use super::generator::generate_hex;

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("Failed to generate nonce: {0}")]
    Random(#[from] rand::Error),
}

/// Concurrent set of live nonces.
///
/// Inserts are visible to every reader as soon as `issue` returns. Nothing is
/// persisted, so a restart always starts empty.
#[derive(Debug)]
pub struct NonceRegistry {
    nonces: DashMap<String, ()>,
    size_bytes: usize,
}

impl NonceRegistry {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            nonces: DashMap::new(),
            size_bytes,
        }
    }

    /// Mint and register a fresh nonce.
    ///
    /// Collisions are not checked; with the default 64 bytes of entropy they
    /// do not happen in practice.
    pub fn issue(&self) -> Result<String, NonceError> {
        let nonce = generate_hex(self.size_bytes)?;
        self.nonces.insert(nonce.clone(), ());
        Ok(nonce)
    }

    /// Mint a nonce that is revoked when the returned guard is dropped.
    pub fn issue_guarded(self: &Arc<Self>) -> Result<NonceGuard, NonceError> {
        let nonce = self.issue()?;
        Ok(NonceGuard {
            nonce,
            registry: Arc::clone(self),
        })
    }

    /// Remove a nonce. Revoking an unknown nonce is a no-op.
    pub fn revoke(&self, nonce: &str) {
        self.nonces.remove(nonce);
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.nonces.contains_key(nonce)
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

/// A live nonce, revoked from its registry on drop.
#[derive(Debug)]
pub struct NonceGuard {
    nonce: String,
    registry: Arc<NonceRegistry>,
}

impl NonceGuard {
    pub fn as_str(&self) -> &str {
        &self.nonce
    }
}

impl Drop for NonceGuard {
    fn drop(&mut self) {
        self.registry.revoke(&self.nonce);
        tracing::trace!("Root nonce revoked");
    }
}
