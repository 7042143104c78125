//! Length-prefixed JSON framing between the gateway and a handler process.
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON. Each invocation exchanges exactly two frames: one
//! [`ParentMessage::Invoke`] and one terminal [`ChildMessage`].

use mimic_core::ExecutionResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SandboxError;

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Frames sent to the child.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ParentMessage<'a> {
    Invoke {
        event: &'a Value,
        context: &'a Value,
        /// Absolute deadline in Unix epoch milliseconds.
        #[serde(rename = "deadlineMs")]
        deadline_ms: i64,
    },
}

/// Terminal frames sent by the child.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ChildMessage {
    /// Handler completed; an absent payload is `null`.
    Success {
        #[serde(default)]
        payload: Value,
    },
    /// Handler threw or reported an error.
    Failure { message: String },
    /// The handler module could not be loaded or has no such export.
    ModuleLoadError { detail: String },
}

impl From<ChildMessage> for ExecutionResult {
    fn from(message: ChildMessage) -> Self {
        match message {
            ChildMessage::Success { payload } => Self::Success(payload),
            ChildMessage::Failure { message } => Self::HandlerFailure(message),
            ChildMessage::ModuleLoadError { detail } => Self::ModuleLoadError(detail),
        }
    }
}

/// Serialize `message` and write it as one frame.
///
/// # Errors
/// Returns [`SandboxError::Protocol`] if the frame exceeds
/// [`MAX_FRAME_LEN`] and [`SandboxError::Ipc`] if the write fails.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), SandboxError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(message).map_err(|e| SandboxError::Protocol(format!("encode frame: {e}")))?;
    let len = frame_len(body.len())?;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| SandboxError::Ipc(format!("write frame header: {e}")))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| SandboxError::Ipc(format!("write frame body: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| SandboxError::Ipc(format!("flush frame: {e}")))
}

/// Read one frame and decode it.
///
/// Returns `Ok(None)` if the stream ends before a complete frame arrives,
/// which is how a child that died mid-invocation looks from this side.
///
/// # Errors
/// Returns [`SandboxError::Protocol`] for oversized or undecodable frames and
/// [`SandboxError::Ipc`] for other read failures.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, SandboxError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; HEADER_LEN];
    if !read_or_eof(reader, &mut header).await? {
        return Ok(None);
    }
    let len = checked_len(header)?;
    let mut body = vec![0u8; len];
    if !read_or_eof(reader, &mut body).await? {
        return Ok(None);
    }
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| SandboxError::Protocol(format!("decode frame: {e}")))
}

/// Decode a child frame from the front of `bytes`.
///
/// Returns the message and the number of bytes consumed, or `None` if
/// `bytes` does not yet hold a complete frame.
///
/// # Errors
/// Same as [`read_frame`], minus I/O failures.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<(ChildMessage, usize)>, SandboxError> {
    let Some(header) = bytes.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(header);
    let len = checked_len(raw)?;
    let Some(body) = bytes.get(HEADER_LEN..HEADER_LEN + len) else {
        return Ok(None);
    };
    let message = serde_json::from_slice(body).map_err(|e| SandboxError::Protocol(format!("decode frame: {e}")))?;
    Ok(Some((message, HEADER_LEN + len)))
}

fn checked_len(header: [u8; HEADER_LEN]) -> Result<usize, SandboxError> {
    let len = usize::try_from(u32::from_be_bytes(header))
        .map_err(|_| SandboxError::Protocol("frame length does not fit in memory".to_owned()))?;
    if len > MAX_FRAME_LEN {
        return Err(SandboxError::Protocol(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }
    Ok(len)
}

fn frame_len(len: usize) -> Result<u32, SandboxError> {
    if len > MAX_FRAME_LEN {
        return Err(SandboxError::Protocol(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }
    u32::try_from(len).map_err(|_| SandboxError::Protocol(format!("frame of {len} bytes is too large")))
}

async fn read_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<bool, SandboxError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(SandboxError::Ipc(format!("read frame: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn encode(body: &[u8]) -> Vec<u8> {
        let mut out = match u32::try_from(body.len()) {
            Ok(len) => len.to_be_bytes().to_vec(),
            Err(e) => panic!("test body too large: {e}"),
        };
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn invoke_frame_carries_event_and_context() {
        let (mut parent, mut child) = tokio::io::duplex(1024);
        let event = json!({ "id": "7" });
        let context = json!({ "stage": "dev" });
        let invoke = ParentMessage::Invoke {
            event: &event,
            context: &context,
            deadline_ms: 1_700_000_005_000,
        };
        if let Err(e) = write_frame(&mut parent, &invoke).await {
            panic!("write failed: {e}");
        }
        let received: Option<Value> = match read_frame(&mut child).await {
            Ok(v) => v,
            Err(e) => panic!("read failed: {e}"),
        };
        assert_eq!(
            received,
            Some(json!({
                "type": "invoke",
                "event": { "id": "7" },
                "context": { "stage": "dev" },
                "deadlineMs": 1_700_000_005_000_i64,
            }))
        );
    }

    #[tokio::test]
    async fn terminal_frames_map_to_results() {
        let frames = [
            (r#"{"type":"success","payload":{"ok":true}}"#, ExecutionResult::Success(json!({ "ok": true }))),
            (r#"{"type":"success"}"#, ExecutionResult::Success(Value::Null)),
            (r#"{"type":"failure","message":"boom"}"#, ExecutionResult::HandlerFailure("boom".to_owned())),
            (
                r#"{"type":"moduleLoadError","detail":"Cannot find module"}"#,
                ExecutionResult::ModuleLoadError("Cannot find module".to_owned()),
            ),
        ];
        for (body, expected) in frames {
            let bytes = encode(body.as_bytes());
            let mut reader = bytes.as_slice();
            let message: ChildMessage = match read_frame(&mut reader).await {
                Ok(Some(m)) => m,
                other => panic!("expected frame for {body}, got {other:?}"),
            };
            assert_eq!(ExecutionResult::from(message), expected);
        }
    }

    #[tokio::test]
    async fn truncated_stream_reads_as_eof() {
        let bytes = encode(br#"{"type":"success"}"#);
        for cut in [0, 2, HEADER_LEN, bytes.len() - 1] {
            let mut reader = &bytes[..cut];
            let read: Result<Option<ChildMessage>, _> = read_frame(&mut reader).await;
            assert!(matches!(read, Ok(None)), "cut at {cut} must read as EOF");
        }
    }

    #[tokio::test]
    async fn oversized_length_is_a_protocol_error() {
        let header = u32::MAX.to_be_bytes();
        let mut reader = header.as_slice();
        let read: Result<Option<ChildMessage>, _> = read_frame(&mut reader).await;
        assert!(matches!(read, Err(SandboxError::Protocol(_))));
    }

    #[test]
    fn decode_frame_reports_consumed_bytes() {
        let mut bytes = encode(br#"{"type":"failure","message":"x"}"#);
        let frame_len = bytes.len();
        bytes.extend_from_slice(b"trailing");
        match decode_frame(&bytes) {
            Ok(Some((ChildMessage::Failure { message }, used))) => {
                assert_eq!(message, "x");
                assert_eq!(used, frame_len);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
        assert!(matches!(decode_frame(&bytes[..3]), Ok(None)));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let bytes = encode(br#"{"type":"progress"}"#);
        assert!(matches!(decode_frame(&bytes), Err(SandboxError::Protocol(_))));
    }

    proptest::proptest! {
        #[test]
        fn proptest_decode_frame_never_panics(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256usize)) {
            let _ = decode_frame(&bytes);
        }
    }
}
