//! Per-connection protocol for the socket bridge.

use std::io;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use super::frame_codec;
use crate::api::{full_api_path, API_REQUEST_CONTENT_KEY, ROOT_NONCE_KEY};
use crate::tokens::{NonceError, NonceRegistry};

/// Malformed framing or envelope on a single connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to read from the unix socket: {0}")]
    Read(io::Error),
    #[error("Connection closed before a request was received")]
    Closed,
    #[error("Invalid request envelope: {0}")]
    Envelope(serde_json::Error),
    #[error("Failed to serialize the request content: {0}")]
    Encode(serde_json::Error),
    #[error("Failed to write to the unix socket: {0}")]
    Write(io::Error),
}

/// Everything that can go wrong while bridging one connection.
///
/// None of these escape the connection's task; they are logged and the
/// connection is closed without an error reply.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Failed to issue the root nonce: {0}")]
    AuthToken(#[from] NonceError),
    #[error("Failed to POST the API request: {0}")]
    Forwarding(#[from] reqwest::Error),
}

/// Inbound request sent over the socket.
///
/// Both keys are required, and `request` must be a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub endpoint: String,
    pub request: Map<String, Value>,
}

type Connection = Framed<UnixStream, LengthDelimitedCodec>;

/// Relays socket requests to the local HTTP API as the root user.
#[derive(Debug)]
pub struct Bridge {
    api_port: u16,
    http_client: reqwest::Client,
    max_frame_bytes: usize,
    nonces: Arc<NonceRegistry>,
}

impl Bridge {
    /// `http_client` is used as is; the bridge applies no request timeout.
    pub fn new(
        api_port: u16,
        nonces: Arc<NonceRegistry>,
        http_client: reqwest::Client,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            api_port,
            http_client,
            max_frame_bytes,
            nonces,
        }
    }

    /// Serve one request on `stream`, then close it.
    pub async fn handle(&self, stream: UnixStream) -> Result<(), ConnectionError> {
        let mut connection = Framed::new(stream, frame_codec(self.max_frame_bytes));

        let result = self.relay(&mut connection).await;

        if let Err(e) = connection.get_mut().shutdown().await {
            debug!(error = %e, "Failed to close the unix socket connection");
        }

        result
    }

    async fn relay(&self, connection: &mut Connection) -> Result<(), ConnectionError> {
        let frame = match connection.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(ProtocolError::Read(e).into()),
            None => return Err(ProtocolError::Closed.into()),
        };

        let envelope = parse_envelope(&frame)?;

        // Revoked when `nonce` drops, whichever way this function returns
        let nonce = self.nonces.issue_guarded()?;

        let content = build_form_content(envelope.request, nonce.as_str())
            .map_err(ProtocolError::Encode)?;

        let response = self.forward(&envelope.endpoint, content).await?;

        connection
            .send(response)
            .await
            .map_err(ProtocolError::Write)?;

        Ok(())
    }

    /// POST the content to the API over loopback and return the raw body.
    ///
    /// HTTP error statuses are not errors here; their bodies are relayed too.
    async fn forward(&self, endpoint: &str, content: String) -> Result<Bytes, reqwest::Error> {
        let url = format!(
            "http://127.0.0.1:{}{}",
            self.api_port,
            full_api_path(endpoint)
        );

        let response = self
            .http_client
            .post(&url)
            .form(&[(API_REQUEST_CONTENT_KEY, content.as_str())])
            .send()
            .await?;

        debug!(endpoint = %endpoint, status = %response.status(), "Forwarded socket request");

        response.bytes().await
    }
}

/// Decode a request frame into an envelope.
pub fn parse_envelope(buf: &[u8]) -> Result<RequestEnvelope, ProtocolError> {
    serde_json::from_slice(buf).map_err(ProtocolError::Envelope)
}

/// Add the nonce to the request content and serialize it for the form field.
pub fn build_form_content(
    mut request: Map<String, Value>,
    nonce: &str,
) -> Result<String, serde_json::Error> {
    request.insert(ROOT_NONCE_KEY.to_string(), Value::String(nonce.to_string()));
    serde_json::to_string(&request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let envelope =
            parse_envelope(br#"{"endpoint":"users/get","request":{"target-email":"x"}}"#).unwrap();

        assert_eq!(envelope.endpoint, "users/get");
        assert_eq!(envelope.request.get("target-email"), Some(&json!("x")));
    }

    #[test]
    fn test_parse_envelope_empty_request() {
        let envelope = parse_envelope(br#"{"endpoint":"system/health","request":{}}"#).unwrap();
        assert!(envelope.request.is_empty());
    }

    #[test]
    fn test_parse_envelope_embedded_newlines() {
        let envelope =
            parse_envelope(b"{\"endpoint\":\"a\",\n\"request\":{\"text\":\"line1\\nline2\"}}")
                .unwrap();
        assert_eq!(envelope.request["text"], json!("line1\nline2"));
    }

    #[test]
    fn test_parse_envelope_rejects_malformed() {
        let cases: &[&[u8]] = &[
            b"not json",
            br#"{"request":{}}"#,
            br#"{"endpoint":"users/get"}"#,
            br#"{"endpoint":"users/get","request":[1,2]}"#,
            br#"{"endpoint":"users/get","request":"x"}"#,
            br#"{"endpoint":5,"request":{}}"#,
            br#"[]"#,
        ];

        for (i, case) in cases.iter().enumerate() {
            assert!(
                matches!(parse_envelope(case), Err(ProtocolError::Envelope(_))),
                "case {i} should be rejected"
            );
        }
    }

    #[test]
    fn test_build_form_content_adds_only_nonce() {
        let request = match json!({"target-email": "x", "nested": {"a": [1, 2]}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let content = build_form_content(request.clone(), "abc123").unwrap();
        let decoded: Map<String, Value> = serde_json::from_str(&content).unwrap();

        assert_eq!(decoded.len(), request.len() + 1);
        assert_eq!(decoded[ROOT_NONCE_KEY], json!("abc123"));
        for (key, value) in &request {
            assert_eq!(decoded.get(key), Some(value));
        }
    }

    #[test]
    fn test_build_form_content_overrides_supplied_nonce() {
        let request = match json!({ROOT_NONCE_KEY: "forged"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let content = build_form_content(request, "real").unwrap();
        let decoded: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(decoded, json!({ROOT_NONCE_KEY: "real"}));
    }

    #[test]
    fn test_connection_error_display() {
        let e = ConnectionError::from(ProtocolError::Closed);
        assert!(e.to_string().contains("Connection closed"));
    }
}
