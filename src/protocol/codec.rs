//! Framed wire codec.
//!
//! Each frame is:
//! - 4 bytes: payload length N (big-endian u32)
//! - 1 byte: protocol version
//! - N-1 bytes: UTF-8 JSON envelope `{"signal": .., "kind": .., ..fields}`

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::protocol::message::{Body, Message};
use crate::protocol::signal::Signal;

pub const PROTOCOL_VERSION: u8 = 1;

/// Largest accepted frame (32 MiB). Episode windows with thumbnails are the
/// biggest messages.
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("empty frame")]
    EmptyFrame,
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message kind does not match signal {0}")]
    SignalMismatch(Signal),
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Whether the underlying stream failed. Every other error concerns a
    /// single message and leaves the stream usable.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    signal: Signal,
    #[serde(flatten)]
    body: Body,
}

/// Serialize a message into a frame payload (version byte + JSON).
pub fn encode_payload(message: Message) -> Result<Vec<u8>, ProtocolError> {
    let (signal, body) = message.into_parts();
    let mut payload = vec![PROTOCOL_VERSION];
    serde_json::to_writer(&mut payload, &Envelope { signal, body })?;
    Ok(payload)
}

/// Parse a frame payload produced by [`encode_payload`].
pub fn decode_payload(payload: &[u8]) -> Result<Message, ProtocolError> {
    let (&version, json) = payload.split_first().ok_or(ProtocolError::EmptyFrame)?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    let Envelope { signal, body } = serde_json::from_slice(json)?;
    Message::from_parts(signal, body).ok_or(ProtocolError::SignalMismatch(signal))
}

/// tokio-util codec for [`Message`] streams.
#[derive(Debug)]
pub struct MessageCodec {
    frames: LengthDelimitedCodec,
    max_frame: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame)
                .new_codec(),
            max_frame,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.frames.decode(src)? {
            Some(frame) => decode_payload(&frame).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = encode_payload(item)?;
        if payload.len() > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame,
            });
        }
        dst.reserve(4 + payload.len());
        self.frames.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}
