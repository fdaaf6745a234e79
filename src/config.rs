use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Default entropy for root-user nonces, in bytes before hex encoding.
pub const DEFAULT_NONCE_SIZE_BYTES: usize = 64;

/// Default maximum size of a single socket frame (64 MB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const SOCKET_FILE_NAME: &str = "autograder.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub socket: SocketConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_host: String,
    /// Port of the HTTP API. The socket bridge also forwards to this port.
    pub http_port: u16,
}

#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub max_frame_bytes: usize,
    pub nonce_size_bytes: usize,
    pub path: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            http_port: 8080,
        }
    }
}

impl SocketConfig {
    /// Socket settings with the default limits, bound at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            nonce_size_bytes: DEFAULT_NONCE_SIZE_BYTES,
            path: path.into(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let data_dir =
            PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));

        let socket_path = std::env::var("UNIX_SOCKET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join(SOCKET_FILE_NAME));

        let web_defaults = WebConfig::default();
        let bind_host = std::env::var("WEB_BIND_HOST").unwrap_or(web_defaults.bind_host);
        let http_port = parse_env("WEB_HTTP_PORT")?.unwrap_or(web_defaults.http_port);

        let nonce_size_bytes = parse_env("NONCE_SIZE_BYTES")?.unwrap_or(DEFAULT_NONCE_SIZE_BYTES);
        let max_frame_bytes =
            parse_env("SOCKET_MAX_FRAME_BYTES")?.unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        let config = Config {
            data_dir,
            socket: SocketConfig {
                max_frame_bytes,
                nonce_size_bytes,
                path: socket_path,
            },
            web: WebConfig {
                bind_host,
                http_port,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.http_port == 0 {
            return Err(ConfigError::ValidationError(
                "WEB_HTTP_PORT cannot be 0".to_string(),
            ));
        }

        if self.socket.nonce_size_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "NONCE_SIZE_BYTES must be greater than 0".to_string(),
            ));
        }

        if self.socket.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "SOCKET_MAX_FRAME_BYTES must be greater than 0".to_string(),
            ));
        }

        if self.socket.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "UNIX_SOCKET_PATH cannot be empty".to_string(),
            ));
        }

        if self.socket.nonce_size_bytes < 16 {
            tracing::warn!(
                nonce_size_bytes = self.socket.nonce_size_bytes,
                "Root nonces are shorter than 16 bytes. They may be guessable."
            );
        }

        Ok(())
    }

    /// Address the HTTP API listens on.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.web.bind_host, self.web.http_port)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ConfigError::ValidationError(format!("{key} has an invalid value: '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;

    #[test]
    fn test_default_config_is_valid() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket.nonce_size_bytes, DEFAULT_NONCE_SIZE_BYTES);
    }

    #[test]
    fn test_zero_nonce_size_rejected() {
        let mut config = test_config();
        config.socket.nonce_size_bytes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = test_config();
        config.web.http_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let mut config = test_config();
        config.socket.max_frame_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address() {
        let mut config = test_config();
        config.web.bind_host = "0.0.0.0".to_string();
        config.web.http_port = 9000;
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_socket_config_at_uses_defaults() {
        let socket = SocketConfig::at("/tmp/x.sock");
        assert_eq!(socket.path, PathBuf::from("/tmp/x.sock"));
        assert_eq!(socket.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }
}
