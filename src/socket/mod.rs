//! Local Unix socket bridge into the HTTP API.
//!
//! A co-located tool (e.g. the admin CLI) writes one length-delimited JSON
//! envelope to the socket. The bridge mints a single-use root nonce, forwards
//! the request to the API over loopback, and writes the raw response back.

pub mod bridge;
pub mod client;
pub mod server;

pub use bridge::{Bridge, ConnectionError, ProtocolError, RequestEnvelope};
pub use client::{send_raw, send_request, ClientError};
pub use server::{ServerError, UnixSocketServer, STOP_LOCK};

use tokio_util::codec::LengthDelimitedCodec;

/// Codec for socket frames: 4-byte big-endian length prefix, then payload.
pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::bytes::Bytes;
    use tokio_util::codec::Framed;

    #[tokio::test]
    async fn test_frames_carry_control_characters() {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = Framed::new(a, frame_codec(1024));
        let mut reader = Framed::new(b, frame_codec(1024));

        let payload = Bytes::from_static(b"{\"text\":\"a\\nb\"}\n\r\t\x00");
        writer.send(payload.clone()).await.unwrap();

        let frame = reader.next().await.unwrap().unwrap();
        assert_eq!(frame.freeze(), payload);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = Framed::new(a, frame_codec(64));
        let mut reader = Framed::new(b, frame_codec(8));

        writer.send(Bytes::from_static(b"0123456789")).await.unwrap();

        assert!(matches!(reader.next().await, Some(Err(_))));
    }
}
