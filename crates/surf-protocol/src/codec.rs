// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Framed codec for the native-messaging pipe between the bridge daemon
//! and the router.
//!
//! Wire format per message:
//!   [4 bytes **native-endian** length][UTF-8 JSON payload]
//!
//! Native messaging is a same-host transport (the browser and the host
//! process always share an architecture), so the length prefix is encoded
//! with the platform's native byte order rather than a fixed endianness —
//! unlike network protocols (compare `sven-p2p`'s CBOR codec, which uses
//! big-endian because it runs over an actual network).
//!
//! Max payload size is 1 MiB; larger outbound messages must be split by
//! the caller (screenshots, bodies) rather than sent as one frame.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Stateless framed reader/writer. Construct once per transport (the
/// daemon holds one for stdin, one for stdout) and drive it from a single
/// owning task — stdin has exactly one reader and stdout exactly one
/// writer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FramedCodec;

impl FramedCodec {
    /// Write one message atomically: the length prefix and payload are
    /// written back-to-back with no interleaving possible because both
    /// writes happen before the caller can yield to another writer of the
    /// same sink (callers must still serialize access to the sink itself,
    /// e.g. via a single writer task fed by a channel).
    pub async fn write_message<W>(&self, sink: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        if payload.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge { limit: MAX_FRAME_BYTES, actual: payload.len() });
        }
        let len = payload.len() as u32;
        sink.write_all(&len.to_ne_bytes()).await?;
        sink.write_all(payload).await?;
        sink.flush().await?;
        Ok(())
    }

    pub async fn write_json<W, T>(&self, sink: &mut W, value: &T) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let payload = serde_json::to_vec(value)?;
        self.write_message(sink, &payload).await
    }

    /// Read the next full frame. Returns `ProtocolError::Eof` on a clean
    /// pipe close before any bytes of the next frame arrive, and
    /// `ProtocolError::PartialFrame` if the connection closes mid-frame.
    pub async fn read_next<R>(&self, source: &mut R) -> Result<Vec<u8>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        match source.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::Eof),
            Err(e) => return Err(ProtocolError::Io(e)),
        }
        let len = u32::from_ne_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge { limit: MAX_FRAME_BYTES, actual: len });
        }
        let mut payload = vec![0u8; len];
        source
            .read_exact(&mut payload)
            .await
            .map_err(|_| ProtocolError::PartialFrame)?;
        Ok(payload)
    }

    pub async fn read_json<R, T>(&self, source: &mut R) -> Result<T, ProtocolError>
    where
        R: AsyncRead + Unpin,
        T: for<'de> serde::Deserialize<'de>,
    {
        let payload = self.read_next(source).await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_message() {
        let (mut a, mut b) = duplex(4096);
        let codec = FramedCodec;
        codec.write_json(&mut a, &json!({"hello": "world"})).await.unwrap();
        let v: serde_json::Value = codec.read_json(&mut b).await.unwrap();
        assert_eq!(v, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn frame_at_exactly_the_limit_is_accepted() {
        let (mut a, mut b) = duplex(MAX_FRAME_BYTES + 64);
        let codec = FramedCodec;
        let payload = vec![b'x'; MAX_FRAME_BYTES];
        codec.write_message(&mut a, &payload).await.unwrap();
        let back = codec.read_next(&mut b).await.unwrap();
        assert_eq!(back.len(), MAX_FRAME_BYTES);
    }

    #[tokio::test]
    async fn frame_one_byte_over_the_limit_is_rejected_on_write() {
        let (mut a, _b) = duplex(MAX_FRAME_BYTES + 64);
        let codec = FramedCodec;
        let payload = vec![b'x'; MAX_FRAME_BYTES + 1];
        let err = codec.write_message(&mut a, &payload).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn clean_close_before_next_frame_is_eof() {
        let (a, mut b) = duplex(64);
        drop(a);
        let codec = FramedCodec;
        let err = codec.read_next(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Eof));
    }

    #[tokio::test]
    async fn close_mid_frame_is_partial_frame() {
        let (mut a, mut b) = duplex(64);
        // Write only the length prefix, announcing more than we send, then close.
        a.write_all(&50u32.to_ne_bytes()).await.unwrap();
        a.write_all(b"short").await.unwrap();
        drop(a);
        let codec = FramedCodec;
        let err = codec.read_next(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::PartialFrame));
    }
}
