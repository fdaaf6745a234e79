//! Client side of the socket protocol, for local tools.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::net::UnixStream;
use tokio_util::bytes::Bytes;
use tokio_util::codec::Framed;

use super::bridge::RequestEnvelope;
use super::frame_codec;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to the unix socket {}: {source}", path.display())]
    Connect { path: PathBuf, source: io::Error },
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Socket IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Connection closed without a response")]
    ConnectionClosed,
}

/// Send `request` to `endpoint` through the socket at `path` and return the
/// raw API response body.
pub async fn send_request(
    path: &Path,
    endpoint: &str,
    request: Map<String, Value>,
    max_frame_bytes: usize,
) -> Result<Bytes, ClientError> {
    let envelope = RequestEnvelope {
        endpoint: endpoint.to_string(),
        request,
    };
    let payload = serde_json::to_vec(&envelope)?;

    send_raw(path, Bytes::from(payload), max_frame_bytes).await
}

/// Send one already-encoded frame and wait for the single reply frame.
///
/// The bridge answers malformed requests by closing the connection, which
/// shows up here as [`ClientError::ConnectionClosed`].
pub async fn send_raw(
    path: &Path,
    payload: Bytes,
    max_frame_bytes: usize,
) -> Result<Bytes, ClientError> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| ClientError::Connect {
            path: path.to_path_buf(),
            source,
        })?;

    let mut framed = Framed::new(stream, frame_codec(max_frame_bytes));
    framed.send(payload).await?;

    match framed.next().await {
        Some(Ok(frame)) => Ok(frame.freeze()),
        Some(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(ClientError::ConnectionClosed)
        }
        Some(Err(e)) => Err(e.into()),
        None => Err(ClientError::ConnectionClosed),
    }
}
