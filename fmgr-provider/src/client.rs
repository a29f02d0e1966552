//! FortiManager JSON-RPC client
//!
//! Builds `get` and `move` requests, hands them to a [`Transport`], and
//! interprets the per-URL status that FortiManager returns. The transport
//! itself (HTTP, TLS, login) lives behind the trait.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fmgr_core::position::Relation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code FortiManager returns for a URL that names nothing
pub const STATUS_OBJECT_NOT_EXIST: i64 = -3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcMethod {
    Get,
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcParams {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: RpcMethod,
    pub params: Vec<RpcParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl RpcStatus {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: "OK".to_string(),
        }
    }

    pub fn not_exist() -> Self {
        Self {
            code: STATUS_OBJECT_NOT_EXIST,
            message: "Object does not exist".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResult {
    pub status: RpcStatus,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Vec<RpcResult>,
}

/// Per-call transport settings
///
/// Passed explicitly with every call; nothing on the client is mutated to
/// change them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConfig {
    /// Attempts the transport may make before giving up
    pub retries: u32,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            retries: 3,
        }
    }
}

impl CallConfig {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("request timed out")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Sends one JSON-RPC request and returns the decoded response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        request: &RpcRequest,
        config: &CallConfig,
    ) -> Result<RpcResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{url}: {message} (code {code})")]
    Api {
        code: i64,
        message: String,
        url: String,
    },

    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("empty result for {0}")]
    EmptyResult(String),

    #[error("{url}: expected a list of entries")]
    UnexpectedData { url: String },
}

/// JSON-RPC client over an arbitrary transport
pub struct FmgClient<T: Transport> {
    transport: T,
    session: Option<String>,
    next_id: AtomicU64,
}

impl<T: Transport> FmgClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a session token obtained from a login call
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a single-URL request and return its result entry
    async fn call(
        &self,
        method: RpcMethod,
        params: RpcParams,
        config: &CallConfig,
    ) -> Result<RpcResult, ClientError> {
        let url = params.url.clone();
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: vec![params],
            session: self.session.clone(),
        };

        log::debug!(
            "rpc #{} {:?} {} (retries: {})",
            request.id,
            method,
            url,
            config.retries
        );

        let response = self.transport.call(&request, config).await?;
        if response.id != request.id {
            return Err(ClientError::IdMismatch {
                expected: request.id,
                got: response.id,
            });
        }

        response
            .result
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyResult(url))
    }

    /// Fetch the current entries of an ordered collection, in remote order
    ///
    /// Returns `Ok(None)` when the collection (or one of its parents) does
    /// not exist.
    pub async fn get_collection(
        &self,
        url: &str,
        config: &CallConfig,
    ) -> Result<Option<Vec<serde_json::Value>>, ClientError> {
        let params = RpcParams {
            url: url.to_string(),
            option: None,
            target: None,
        };
        let result = self.call(RpcMethod::Get, params, config).await?;

        match result.status.code {
            0 => {}
            STATUS_OBJECT_NOT_EXIST => return Ok(None),
            code => {
                return Err(ClientError::Api {
                    code,
                    message: result.status.message,
                    url: url.to_string(),
                });
            }
        }

        match result.data {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Array(entries)) => Ok(Some(entries)),
            Some(_) => Err(ClientError::UnexpectedData {
                url: url.to_string(),
            }),
        }
    }

    /// Ask FortiManager to move the entry at `entry_url` next to `target`
    pub async fn move_entry(
        &self,
        entry_url: &str,
        relation: Relation,
        target: &str,
        config: &CallConfig,
    ) -> Result<(), ClientError> {
        let params = RpcParams {
            url: entry_url.to_string(),
            option: Some(relation.to_string()),
            target: Some(target.to_string()),
        };
        let result = self.call(RpcMethod::Move, params, config).await?;

        if result.status.code != 0 {
            return Err(ClientError::Api {
                code: result.status.code,
                message: result.status.message,
                url: entry_url.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    /// Replays canned results and remembers what was sent
    struct ScriptedTransport {
        results: Mutex<Vec<RpcResult>>,
        sent: Mutex<Vec<RpcRequest>>,
        id_offset: u64,
    }

    impl ScriptedTransport {
        fn new(results: Vec<RpcResult>) -> Self {
            Self {
                results: Mutex::new(results),
                sent: Mutex::new(Vec::new()),
                id_offset: 0,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn call(
            &self,
            request: &RpcRequest,
            _config: &CallConfig,
        ) -> Result<RpcResponse, TransportError> {
            self.sent.lock().await.push(request.clone());
            let mut results = self.results.lock().await;
            if results.is_empty() {
                return Err(TransportError::Io("connection reset".to_string()));
            }
            Ok(RpcResponse {
                id: request.id + self.id_offset,
                result: vec![results.remove(0)],
            })
        }
    }

    fn result(status: RpcStatus, data: Option<serde_json::Value>) -> RpcResult {
        RpcResult {
            status,
            url: String::new(),
            data,
        }
    }

    #[test]
    fn request_wire_format() {
        let request = RpcRequest {
            id: 7,
            method: RpcMethod::Move,
            params: vec![RpcParams {
                url: "/pm/config/adom/root/pkg/p/firewall/policy/3".to_string(),
                option: Some("before".to_string()),
                target: Some("1".to_string()),
            }],
            session: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "id": 7,
                "method": "move",
                "params": [{
                    "url": "/pm/config/adom/root/pkg/p/firewall/policy/3",
                    "option": "before",
                    "target": "1"
                }]
            })
        );
    }

    #[test]
    fn response_wire_format() {
        let response: RpcResponse = serde_json::from_value(json!({
            "id": 1,
            "result": [{
                "status": {"code": 0, "message": "OK"},
                "url": "/pm/config/global/obj/x",
                "data": [{"id": 1}]
            }]
        }))
        .unwrap();
        assert_eq!(response.result[0].status, RpcStatus::ok());
        assert_eq!(response.result[0].data, Some(json!([{"id": 1}])));
    }

    #[tokio::test]
    async fn get_collection_returns_entries() {
        let client = FmgClient::new(ScriptedTransport::new(vec![result(
            RpcStatus::ok(),
            Some(json!([{"id": "1"}, {"id": "2"}])),
        )]))
        .with_session("token");

        let entries = client
            .get_collection("/c", &CallConfig::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entries.len(), 2);

        let sent = client.transport().sent.lock().await;
        assert_eq!(sent[0].method, RpcMethod::Get);
        assert_eq!(sent[0].session.as_deref(), Some("token"));
    }

    #[tokio::test]
    async fn get_collection_not_exist_is_none() {
        let client = FmgClient::new(ScriptedTransport::new(vec![
            result(RpcStatus::not_exist(), None),
            result(RpcStatus::ok(), None),
        ]));
        let config = CallConfig::default();
        assert_eq!(client.get_collection("/c", &config).await.unwrap(), None);
        assert_eq!(client.get_collection("/c", &config).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_collection_rejects_single_object() {
        let client = FmgClient::new(ScriptedTransport::new(vec![result(
            RpcStatus::ok(),
            Some(json!({"id": 1})),
        )]));
        let err = client
            .get_collection("/c", &CallConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedData { .. }));
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let client = FmgClient::new(ScriptedTransport::new(vec![result(
            RpcStatus {
                code: -11,
                message: "No permission for the resource".to_string(),
            },
            None,
        )]));
        let err = client
            .move_entry("/c/3", Relation::After, "1", &CallConfig::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "/c/3: No permission for the resource (code -11)"
        );
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let client = FmgClient::new(ScriptedTransport::new(vec![]));
        let err = client
            .get_collection("/c", &CallConfig::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Transport(TransportError::Io("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn mismatched_response_id() {
        let mut transport = ScriptedTransport::new(vec![result(RpcStatus::ok(), None)]);
        transport.id_offset = 5;
        let client = FmgClient::new(transport);
        let err = client
            .move_entry("/c/3", Relation::Before, "1", &CallConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::IdMismatch { expected: 1, got: 6 });
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let client = FmgClient::new(ScriptedTransport::new(vec![
            result(RpcStatus::ok(), None),
            result(RpcStatus::ok(), None),
        ]));
        let config = CallConfig::default().with_retries(1);
        client.move_entry("/c/1", Relation::Before, "2", &config).await.unwrap();
        client.move_entry("/c/1", Relation::After, "2", &config).await.unwrap();

        let sent = client.transport().sent.lock().await;
        assert_eq!(sent[0].id, 1);
        assert_eq!(sent[1].id, 2);
        assert_eq!(sent[1].params[0].option.as_deref(), Some("after"));
    }
}
