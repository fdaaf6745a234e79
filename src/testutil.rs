//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, SocketConfig, WebConfig};
use crate::AppState;

/// A minimal `Config` suitable for unit tests.
pub fn test_config() -> Config {
    Config {
        data_dir: "/tmp/test".into(),
        socket: SocketConfig::at("/tmp/test/autograder.sock"),
        web: WebConfig::default(),
    }
}

/// A config whose socket lives under `dir` and whose API listens on `port`.
pub fn test_config_in(dir: &Path, port: u16) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        socket: SocketConfig::at(dir.join("sockets").join("autograder.sock")),
        web: WebConfig {
            bind_host: "127.0.0.1".to_string(),
            http_port: port,
        },
    }
}

/// Build a full `Arc<AppState>` around [`test_config`].
pub fn test_state() -> Arc<AppState> {
    Arc::new(AppState::new(test_config()))
}

/// A `reqwest::Client` with proxy disabled
/// (avoids macOS system-configuration panics in sandboxed tests).
pub fn test_http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
