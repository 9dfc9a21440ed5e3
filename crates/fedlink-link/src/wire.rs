//! Length-prefixed JSON framing used on peer sessions.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! JSON. The JSON object is tagged by `type`.

use crate::error::WireError;
use fedlink_types::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame either side may send.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// A frame already serialised, length prefix included.
///
/// Shared between every peer queue an event is fanned out to.
pub type EncodedFrame = Arc<[u8]>;

/// Messages exchanged with a federation peer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Sent by us right after connecting when the peer has a username.
    Auth { username: String, password: String },
    /// The peer's answer to [`Frame::Auth`].
    AuthResult {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// An outbound event of a given data type.
    Event {
        data_type: DataType,
        payload: serde_json::Value,
    },
    Ping,
    Pong,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { username, .. } => f
                .debug_struct("Auth")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::AuthResult { ok, reason } => f
                .debug_struct("AuthResult")
                .field("ok", ok)
                .field("reason", reason)
                .finish(),
            Self::Event { data_type, .. } => {
                f.debug_struct("Event").field("data_type", data_type).finish_non_exhaustive()
            }
            Self::Ping => f.write_str("Ping"),
            Self::Pong => f.write_str("Pong"),
        }
    }
}

/// Serialises a frame, length prefix included.
pub fn encode_frame(frame: &Frame, max: usize) -> Result<EncodedFrame, WireError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > max {
        return Err(WireError::FrameTooLarge {
            len: body.len(),
            max,
        });
    }
    let len = u32::try_from(body.len()).map_err(|_| WireError::FrameTooLarge {
        len: body.len(),
        max,
    })?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out.into())
}

/// Writes an already-encoded frame and flushes.
pub async fn write_encoded<W>(writer: &mut W, encoded: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Encodes and writes a frame.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode_frame(frame, MAX_FRAME_BYTES)?;
    write_encoded(writer, &encoded).await
}

/// Reads one frame.
///
/// A clean EOF before the length prefix is reported as [`WireError::Closed`].
/// Not cancel-safe: run it in a dedicated task rather than in a `select!`.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Frame, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(WireError::Closed),
        Err(e) => return Err(e.into()),
    };
    if len > max {
        return Err(WireError::FrameTooLarge { len, max });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_by_type() {
        let json = serde_json::to_value(Frame::Event {
            data_type: DataType::DataPackages,
            payload: serde_json::json!({"uid": "abc"}),
        })
        .unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["data_type"], "datapackages");

        let ping = serde_json::to_string(&Frame::Ping).unwrap();
        assert_eq!(ping, r#"{"type":"ping"}"#);

        let result: Frame = serde_json::from_str(r#"{"type":"auth_result","ok":true}"#).unwrap();
        assert_eq!(result, Frame::AuthResult { ok: true, reason: None });
    }

    #[test]
    fn encoded_frame_has_big_endian_prefix() {
        let encoded = encode_frame(&Frame::Pong, MAX_FRAME_BYTES).unwrap();
        let body = br#"{"type":"pong"}"#;
        assert_eq!(&encoded[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&encoded[4..], body);
    }

    #[test]
    fn oversize_frame_is_refused_on_encode() {
        let frame = Frame::Event {
            data_type: DataType::Cot,
            payload: serde_json::Value::String("x".repeat(64)),
        };
        assert!(matches!(
            encode_frame(&frame, 16),
            Err(WireError::FrameTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn auth_debug_hides_password() {
        let frame = Frame::Auth {
            username: "fed".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{frame:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn read_back_what_was_written() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &Frame::Ping).await.unwrap();
        write_frame(
            &mut a,
            &Frame::Auth {
                username: "u".into(),
                password: "p".into(),
            },
        )
        .await
        .unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, MAX_FRAME_BYTES).await.unwrap(), Frame::Ping);
        assert!(matches!(
            read_frame(&mut b, MAX_FRAME_BYTES).await.unwrap(),
            Frame::Auth { .. }
        ));
        assert!(matches!(
            read_frame(&mut b, MAX_FRAME_BYTES).await,
            Err(WireError::Closed)
        ));
    }

    #[tokio::test]
    async fn oversize_length_prefix_is_rejected_before_reading_body() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(1_000_000u32).to_be_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, 1024).await,
            Err(WireError::FrameTooLarge { len: 1_000_000, max: 1024 })
        ));
    }
}
