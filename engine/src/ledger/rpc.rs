//! JSON-RPC 2.0 ledger client over HTTP.
//!
//! ## Method Index
//!
//! | Method                | Params                      | Result                        |
//! |-----------------------|-----------------------------|-------------------------------|
//! | `getAccount`          | `{address}`                 | `{address, sequence}`         |
//! | `simulateTransaction` | `{transaction}`             | `{returnValue}`               |
//! | `sendTransaction`     | `{transaction}`             | `{hash, status, error?}`      |
//! | `getTransaction`      | `{hash}`                    | [`TxStatus`]                  |
//!
//! Application error codes:
//!
//! - `-32002`: account not found
//! - `-32003`: transaction rejected (bad signature, stale nonce, contract error)
//! - `-32005`: contract not found
//!
//! Request ids are fresh UUIDv4 strings, and a response whose id does not
//! match is treated as malformed.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::{LedgerClient, LedgerError, TxStatus};
use crate::crypto::keys::Address;
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    #[serde(rename = "getAccount")]
    GetAccount,
    #[serde(rename = "simulateTransaction")]
    SimulateTransaction,
    #[serde(rename = "sendTransaction")]
    SendTransaction,
    #[serde(rename = "getTransaction")]
    GetTransaction,
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: RpcMethod,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: serde_json::Value::String(Uuid::new_v4().to_string()),
            method,
            params,
        }
    }
}

/// Exactly one of `result` or `error` is set by a conforming server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub const ACCOUNT_NOT_FOUND: i32 = -32002;
    pub const TRANSACTION_REJECTED: i32 = -32003;
    pub const CONTRACT_NOT_FOUND: i32 = -32005;

    pub fn into_ledger_error(self) -> LedgerError {
        match self.code {
            Self::ACCOUNT_NOT_FOUND => LedgerError::AccountNotFound(self.message),
            Self::CONTRACT_NOT_FOUND => LedgerError::ContractNotFound(self.message),
            Self::TRANSACTION_REJECTED => LedgerError::Rejected(self.message),
            // -32700..=-32600 are protocol-level: our request or their parser.
            -32700..=-32600 => {
                LedgerError::Malformed(format!("rpc error {}: {}", self.code, self.message))
            }
            code => LedgerError::Rejected(format!("rpc error {}: {}", code, self.message)),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed Response Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountResponse {
    address: String,
    sequence: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulateResponse {
    #[serde(rename = "returnValue", default)]
    return_value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SendResponse {
    hash: String,
    status: String,
    #[serde(default)]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`LedgerClient`] speaking JSON-RPC to a ledger node.
#[derive(Debug, Clone)]
pub struct RpcLedgerClient {
    url: String,
    client: reqwest::Client,
}

impl RpcLedgerClient {
    /// `timeout` bounds every request end to end.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let request = RpcRequest::new(method, params);
        debug!(method = ?method, id = %request.id, "rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "HTTP {} from ledger rpc",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        if body.id != request.id {
            return Err(LedgerError::Malformed(format!(
                "response id {} does not match request id {}",
                body.id, request.id
            )));
        }
        if let Some(error) = body.error {
            return Err(error.into_ledger_error());
        }
        let result = body
            .result
            .ok_or_else(|| LedgerError::Malformed("response has neither result nor error".into()))?;
        serde_json::from_value(result).map_err(|e| LedgerError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn account_sequence(&self, address: &Address) -> Result<u64, LedgerError> {
        let account: AccountResponse = self
            .call(RpcMethod::GetAccount, json!({ "address": address }))
            .await?;
        Ok(account.sequence)
    }

    async fn simulate(&self, tx: &Transaction) -> Result<serde_json::Value, LedgerError> {
        let sim: SimulateResponse = self
            .call(RpcMethod::SimulateTransaction, json!({ "transaction": tx }))
            .await?;
        Ok(sim.return_value)
    }

    async fn submit(&self, tx: &Transaction) -> Result<String, LedgerError> {
        let sent: SendResponse = self
            .call(RpcMethod::SendTransaction, json!({ "transaction": tx }))
            .await?;
        if sent.status.eq_ignore_ascii_case("error") {
            return Err(LedgerError::Rejected(
                sent.error.unwrap_or_else(|| "transaction rejected".into()),
            ));
        }
        Ok(sent.hash)
    }

    async fn transaction_status(&self, tx_id: &str) -> Result<TxStatus, LedgerError> {
        self.call(RpcMethod::GetTransaction, json!({ "hash": tx_id }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::VaultKeypair;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one HTTP request, answering with whatever `respond` builds
    /// from the decoded JSON-RPC request.
    async fn one_shot_server<F>(respond: F) -> String
    where
        F: FnOnce(RpcRequest) -> serde_json::Value + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(split) = text.find("\r\n\r\n") {
                    let headers = text[..split].to_ascii_lowercase();
                    let len: usize = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse().unwrap())
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + len {
                        break buf[split + 4..split + 4 + len].to_vec();
                    }
                }
            };
            let request: RpcRequest = serde_json::from_slice(&body).unwrap();
            let reply = serde_json::to_vec(&respond(request)).unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                reply.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&reply).await.unwrap();
        });
        format!("http://{}/rpc", addr)
    }

    #[test]
    fn test_error_code_mapping() {
        let err = |code| RpcError {
            code,
            message: "m".into(),
            data: None,
        };
        assert_eq!(
            err(-32002).into_ledger_error(),
            LedgerError::AccountNotFound("m".into())
        );
        assert_eq!(
            err(-32005).into_ledger_error(),
            LedgerError::ContractNotFound("m".into())
        );
        assert_eq!(
            err(-32003).into_ledger_error(),
            LedgerError::Rejected("m".into())
        );
        assert!(matches!(
            err(-32601).into_ledger_error(),
            LedgerError::Malformed(_)
        ));
    }

    #[test]
    fn test_request_ids_are_unique_uuids() {
        let a = RpcRequest::new(RpcMethod::GetAccount, json!({}));
        let b = RpcRequest::new(RpcMethod::GetAccount, json!({}));
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(a.id.as_str().unwrap()).is_ok());
        let wire = serde_json::to_value(&a).unwrap();
        assert_eq!(wire["method"], "getAccount");
        assert_eq!(wire["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn test_account_sequence_over_http() {
        let url = one_shot_server(|req| {
            assert_eq!(req.method, RpcMethod::GetAccount);
            json!({
                "jsonrpc": "2.0",
                "id": req.id,
                "result": {"address": req.params["address"], "sequence": 41}
            })
        })
        .await;
        let client = RpcLedgerClient::new(url, Duration::from_secs(5)).unwrap();
        let kp = VaultKeypair::generate();
        assert_eq!(client.account_sequence(&kp.address()).await.unwrap(), 41);
    }

    #[tokio::test]
    async fn test_account_not_found_over_http() {
        let url = one_shot_server(|req| {
            json!({
                "jsonrpc": "2.0",
                "id": req.id,
                "error": {"code": -32002, "message": "account not found"}
            })
        })
        .await;
        let client = RpcLedgerClient::new(url, Duration::from_secs(5)).unwrap();
        let kp = VaultKeypair::generate();
        assert_eq!(
            client.account_sequence(&kp.address()).await.unwrap_err(),
            LedgerError::AccountNotFound("account not found".into())
        );
    }

    #[tokio::test]
    async fn test_mismatched_id_is_malformed() {
        let url = one_shot_server(|_req| {
            json!({"jsonrpc": "2.0", "id": "someone-else", "result": {"status": "PENDING"}})
        })
        .await;
        let client = RpcLedgerClient::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.transaction_status("abc").await,
            Err(LedgerError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_send_error_status_is_rejection() {
        let url = one_shot_server(|req| {
            json!({
                "jsonrpc": "2.0",
                "id": req.id,
                "result": {"hash": "h", "status": "ERROR", "error": "bad nonce"}
            })
        })
        .await;
        let client = RpcLedgerClient::new(url, Duration::from_secs(5)).unwrap();
        let kp = VaultKeypair::generate();
        let tx = crate::transaction::TransactionBuilder::new(
            crate::transaction::VaultFunction::RevokeToken,
        )
        .source(&kp.address())
        .build();
        assert_eq!(
            client.submit(&tx).await.unwrap_err(),
            LedgerError::Rejected("bad nonce".into())
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client =
            RpcLedgerClient::new(format!("http://127.0.0.1:{port}/rpc"), Duration::from_secs(2))
                .unwrap();
        let err = client.transaction_status("abc").await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
    }
}
