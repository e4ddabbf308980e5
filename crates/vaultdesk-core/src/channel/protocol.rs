//! Wire format for argument forwarding.
//!
//! A 4-byte big-endian length prefix followed by a UTF-8 JSON-RPC 2.0 payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! The only method is `open_paths`; the primary answers with the number of
//! arguments it queued.

use crate::config::InstanceConfig;
use crate::error::{Result, VaultdeskError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_OPEN_PATHS: &str = "open_paths";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request sent by a secondary instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

impl ChannelRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(serde_json::Value::Number(id.into())),
        }
    }

    /// Request asking the primary to open `paths`, in order.
    pub fn open_paths(paths: &[String], id: u64) -> Self {
        Self::new(
            METHOD_OPEN_PATHS,
            serde_json::json!({ "paths": paths }),
            id,
        )
    }
}

/// Params of `open_paths`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenPathsParams {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Result of `open_paths`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPathsResult {
    pub accepted: usize,
}

/// JSON-RPC 2.0 response from the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ChannelError>,
    pub id: Option<serde_json::Value>,
}

impl ChannelResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(ChannelError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Read a length-prefixed frame.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > InstanceConfig::MAX_MESSAGE_SIZE {
        return Err(VaultdeskError::Validation {
            field: "channel_frame".to_string(),
            message: format!(
                "Message size {} exceeds maximum {}",
                len,
                InstanceConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > InstanceConfig::MAX_MESSAGE_SIZE {
        return Err(VaultdeskError::Validation {
            field: "channel_frame".to_string(),
            message: format!(
                "Message size {} exceeds maximum {}",
                payload.len(),
                InstanceConfig::MAX_MESSAGE_SIZE
            ),
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_paths_request_shape() {
        let req = ChannelRequest::open_paths(&["/a".to_string(), "/b".to_string()], 7);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "open_paths");
        assert_eq!(json["params"]["paths"], serde_json::json!(["/a", "/b"]));
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_params_default_to_empty_paths() {
        let params: OpenPathsParams = serde_json::from_str("{}").unwrap();
        assert!(params.paths.is_empty());
    }

    #[test]
    fn test_error_response_omits_result() {
        let resp = ChannelResponse::error(None, METHOD_NOT_FOUND, "Unknown method");
        let json = serde_json::to_string(&resp).unwrap();

        assert!(!json.contains("\"result\""));
        assert!(json.contains("-32601"));
    }

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_written_then_read() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        assert_eq!(&buf[..4], &5u32.to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        let huge_len = (InstanceConfig::MAX_MESSAGE_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}
