// ==============================================================================
// host.rs - TEE Host Runtime Client
// ==============================================================================
// Description: Line-delimited JSON client for the host's Unix-domain socket
// Author: Matt Barham
// Created: 2025-11-15
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================
// Protocol: one JSON request per line, one JSON response per line. The
// socket is local to the enclave; no TLS, no headers. One connection per
// call keeps the client safe for concurrent use. Method names are
// configuration, not constants: hosts expose equivalent operations under
// different names.
// ==============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

/// Errors surfaced by host-runtime calls
#[derive(Error, Debug)]
pub enum HostError {
    #[error("host runtime unavailable: {0}")]
    Unavailable(String),

    #[error("host call timed out after {0:?}")]
    Timeout(Duration),

    #[error("host returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed host response: {0}")]
    Protocol(String),

    #[error("host response exceeds {max} bytes")]
    PayloadTooLarge { max: usize },
}

/// Transport seam for the contract adapter
///
/// The production implementation speaks the host socket; tests provide a
/// scripted mock.
#[async_trait]
pub trait HostTransport: Send + Sync + 'static {
    /// Authenticated read-only contract call; returns the raw return data
    async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, HostError>;

    /// Authenticated signed transaction; returns the transaction hash
    async fn submit_tx(&self, to: &str, data: &[u8], gas: u64) -> Result<String, HostError>;
}

#[derive(Debug, Serialize)]
struct HostRequest<'a> {
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Host socket client
#[derive(Debug, Clone)]
pub struct HostClient {
    socket_path: PathBuf,
    call_method: String,
    submit_method: String,
    call_timeout: Duration,
    max_payload: usize,
}

impl HostClient {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        call_method: impl Into<String>,
        submit_method: impl Into<String>,
        call_timeout: Duration,
        max_payload: usize,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            call_method: call_method.into(),
            submit_method: submit_method.into(),
            call_timeout,
            max_payload,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Cheap reachability check: can the socket be dialed at all
    pub async fn probe(&self) -> Result<(), HostError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| HostError::Unavailable(e.to_string()))?;
        drop(stream);
        Ok(())
    }

    /// One request/response exchange on a fresh connection, under the
    /// per-call deadline
    async fn round_trip(&self, request: &HostRequest<'_>) -> Result<Value, HostError> {
        let exchange = async {
            let mut stream = UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| HostError::Unavailable(e.to_string()))?;

            let mut payload = serde_json::to_vec(request)
                .map_err(|e| HostError::Protocol(format!("request serialization: {e}")))?;
            payload.push(b'\n');
            stream
                .write_all(&payload)
                .await
                .map_err(|e| HostError::Unavailable(e.to_string()))?;
            stream
                .flush()
                .await
                .map_err(|e| HostError::Unavailable(e.to_string()))?;

            // Bounded read: one line, capped one byte past the limit so
            // an oversized response is detected rather than truncated
            let mut reader = BufReader::new(&mut stream).take(self.max_payload as u64 + 1);
            let mut line = String::new();
            reader
                .read_line(&mut line)
                .await
                .map_err(|e| HostError::Unavailable(e.to_string()))?;
            if line.len() > self.max_payload {
                return Err(HostError::PayloadTooLarge { max: self.max_payload });
            }
            if line.trim().is_empty() {
                return Err(HostError::Protocol("empty response".to_string()));
            }

            let response: HostResponse = serde_json::from_str(line.trim())
                .map_err(|e| HostError::Protocol(e.to_string()))?;

            if let Some(error) = response.error {
                return Err(HostError::Rpc { code: error.code, message: error.message });
            }
            response
                .result
                .ok_or_else(|| HostError::Protocol("response carries neither result nor error".to_string()))
        };

        match tokio::time::timeout(self.call_timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HostError::Timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl HostTransport for HostClient {
    async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, HostError> {
        let request = HostRequest {
            method: &self.call_method,
            params: json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
        };
        let result = self.round_trip(&request).await?;

        let raw = result
            .as_str()
            .ok_or_else(|| HostError::Protocol("eth_call result is not a string".to_string()))?;
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(stripped)
            .map_err(|e| HostError::Protocol(format!("eth_call result is not hex: {e}")))?;
        debug!(bytes = bytes.len(), "host read call returned");
        Ok(bytes)
    }

    async fn submit_tx(&self, to: &str, data: &[u8], gas: u64) -> Result<String, HostError> {
        let request = HostRequest {
            method: &self.submit_method,
            params: json!({ "to": to, "data": format!("0x{}", hex::encode(data)), "gas": gas }),
        };
        let result = self.round_trip(&request).await?;

        // Hosts answer either {"hash": "0x.."} or a bare hash string
        let hash = match &result {
            Value::String(hash) => hash.clone(),
            Value::Object(fields) => fields
                .get("hash")
                .and_then(Value::as_str)
                .ok_or_else(|| HostError::Protocol("submit result carries no hash".to_string()))?
                .to_string(),
            other => {
                return Err(HostError::Protocol(format!(
                    "unexpected submit result shape: {other}"
                )))
            }
        };
        debug!(%hash, "host accepted signed transaction");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    /// Start a one-shot scripted server: reads one line, replies with
    /// `response` (if any), then closes.
    async fn scripted_server(path: &Path, response: Option<String>) {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut reader = BufReader::new(&mut stream);
                let mut line = String::new();
                let _ = reader.read_line(&mut line).await;
                if let Some(body) = response {
                    let _ = stream.write_all(body.as_bytes()).await;
                    let _ = stream.write_all(b"\n").await;
                }
                // Keep the connection open briefly so the client reads a
                // clean EOF or its deadline, not a reset
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });
    }

    fn client(path: &Path, timeout: Duration, max_payload: usize) -> HostClient {
        HostClient::new(path, "eth_call", "tx.sign-submit", timeout, max_payload)
    }

    #[tokio::test]
    async fn test_eth_call_decodes_result_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        scripted_server(&path, Some(r#"{"result":"0xdeadbeef"}"#.to_string())).await;

        let client = client(&path, Duration::from_secs(5), 1024 * 1024);
        let bytes = client.eth_call("0x0011", &[0xab]).await.unwrap();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[tokio::test]
    async fn test_submit_returns_hash_from_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        scripted_server(&path, Some(r#"{"result":{"hash":"0xabc123"}}"#.to_string())).await;

        let client = client(&path, Duration::from_secs(5), 1024 * 1024);
        let hash = client.submit_tx("0x0011", &[0x01], 800_000).await.unwrap();
        assert_eq!(hash, "0xabc123");
    }

    #[tokio::test]
    async fn test_rpc_error_is_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        scripted_server(
            &path,
            Some(r#"{"error":{"code":-32000,"message":"Request not pending"}}"#.to_string()),
        )
        .await;

        let client = client(&path, Duration::from_secs(5), 1024 * 1024);
        let err = client.submit_tx("0x0011", &[0x01], 800_000).await.unwrap_err();
        match err {
            HostError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "Request not pending");
            }
            other => panic!("Expected Rpc error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");

        let client = client(&path, Duration::from_secs(1), 1024);
        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, HostError::Unavailable(_)));

        let err = client.eth_call("0x0011", &[]).await.unwrap_err();
        assert!(matches!(err, HostError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        // Server accepts and reads, but never replies
        scripted_server(&path, None).await;

        let client = client(&path, Duration::from_millis(100), 1024);
        let err = client.eth_call("0x0011", &[]).await.unwrap_err();
        assert!(matches!(err, HostError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        let huge = format!(r#"{{"result":"0x{}"}}"#, "00".repeat(4096));
        scripted_server(&path, Some(huge)).await;

        let client = client(&path, Duration::from_secs(5), 256);
        let err = client.eth_call("0x0011", &[]).await.unwrap_err();
        assert!(matches!(err, HostError::PayloadTooLarge { max: 256 }));
    }

    #[tokio::test]
    async fn test_garbage_response_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        scripted_server(&path, Some("not json at all".to_string())).await;

        let client = client(&path, Duration::from_secs(5), 1024);
        let err = client.eth_call("0x0011", &[]).await.unwrap_err();
        assert!(matches!(err, HostError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_probe_succeeds_against_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let client = client(&path, Duration::from_secs(1), 1024);
        client.probe().await.unwrap();
    }
}
