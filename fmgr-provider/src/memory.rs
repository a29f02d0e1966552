//! In-memory FortiManager transport
//!
//! Holds ordered collections keyed by URL and answers `get` and `move`
//! requests the way FortiManager does. Collections can be loaded from and
//! saved to a JSON snapshot file:
//!
//! ```json
//! {
//!   "/pm/config/adom/root/pkg/default/firewall/policy": {
//!     "key": "policyid",
//!     "entries": [{"policyid": 1}, {"policyid": 2}]
//!   }
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use fmgr_core::position::{Relation, key_string};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::client::{
    CallConfig, RpcMethod, RpcParams, RpcRequest, RpcResponse, RpcResult, RpcStatus, Transport,
    TransportError,
};
use crate::scope::unescape_segment;

/// One ordered collection and the field that identifies its entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCollection {
    pub key: String,
    pub entries: Vec<serde_json::Value>,
}

impl MemoryCollection {
    pub fn new(key: impl Into<String>, entries: Vec<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            entries,
        }
    }

    fn position_of(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry
                .get(&self.key)
                .is_some_and(|value| key_string(value) == key)
        })
    }

    /// Keys of all entries, in order
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|entry| entry.get(&self.key).map(key_string))
            .collect()
    }

    /// Move `source` next to `target`. Returns false if either is absent.
    pub fn reposition(&mut self, source: &str, target: &str, relation: Relation) -> bool {
        let (Some(from), Some(_)) = (self.position_of(source), self.position_of(target)) else {
            return false;
        };
        if source == target {
            return true;
        }
        let entry = self.entries.remove(from);
        let anchor = self.position_of(target).unwrap_or(from);
        let at = match relation {
            Relation::Before => anchor,
            Relation::After => anchor + 1,
        };
        self.entries.insert(at, entry);
        true
    }
}

/// Snapshot file contents: collection URL -> collection
pub type Snapshot = BTreeMap<String, MemoryCollection>;

/// Transport that serves collections from memory
#[derive(Default)]
pub struct MemoryTransport {
    collections: Mutex<Snapshot>,
    calls: Mutex<Vec<(RpcRequest, CallConfig)>>,
    failures: Mutex<VecDeque<TransportError>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            collections: Mutex::new(snapshot),
            ..Default::default()
        }
    }

    /// Load collections from a JSON snapshot file
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TransportError::Io(format!("Failed to read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            TransportError::Serialization(format!("Failed to parse snapshot: {}", e))
        })?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current collections back to a JSON snapshot file
    pub async fn save(&self, path: &Path) -> Result<(), TransportError> {
        let snapshot = self.collections.lock().await.clone();
        let content = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            TransportError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;
        tokio::fs::write(path, content).await.map_err(|e| {
            TransportError::Io(format!("Failed to write snapshot {}: {}", path.display(), e))
        })
    }

    pub async fn insert_collection(&self, url: impl Into<String>, collection: MemoryCollection) {
        self.collections.lock().await.insert(url.into(), collection);
    }

    pub async fn collection(&self, url: &str) -> Option<MemoryCollection> {
        self.collections.lock().await.get(url).cloned()
    }

    /// Every request received so far with the settings it was sent with
    pub async fn calls(&self) -> Vec<(RpcRequest, CallConfig)> {
        self.calls.lock().await.clone()
    }

    /// Make the next attempt fail at the transport level
    ///
    /// Queued failures are consumed one per attempt, so a call with
    /// `retries: 3` survives up to two of them.
    pub async fn fail_next(&self, error: TransportError) {
        self.failures.lock().await.push_back(error);
    }

    fn get(collections: &Snapshot, params: &RpcParams) -> RpcResult {
        match collections.get(&params.url) {
            Some(collection) => RpcResult {
                status: RpcStatus::ok(),
                url: params.url.clone(),
                data: Some(serde_json::Value::Array(collection.entries.clone())),
            },
            None => not_exist(&params.url),
        }
    }

    fn reposition(collections: &mut Snapshot, params: &RpcParams) -> RpcResult {
        let relation = params.option.as_deref().and_then(|o| o.parse::<Relation>().ok());
        let (Some(relation), Some(target)) = (relation, params.target.as_deref()) else {
            return RpcResult {
                status: RpcStatus {
                    code: -2,
                    message: "Invalid move parameters".to_string(),
                },
                url: params.url.clone(),
                data: None,
            };
        };

        let Some((collection_url, key)) = split_entry_url(&params.url) else {
            return not_exist(&params.url);
        };
        let moved = collections
            .get_mut(collection_url)
            .is_some_and(|c| c.reposition(&unescape_segment(key), target, relation));

        if moved {
            RpcResult {
                status: RpcStatus::ok(),
                url: params.url.clone(),
                data: None,
            }
        } else {
            not_exist(&params.url)
        }
    }
}

fn not_exist(url: &str) -> RpcResult {
    RpcResult {
        status: RpcStatus::not_exist(),
        url: url.to_string(),
        data: None,
    }
}

/// Split `<collection>/<key>` at the last unescaped `/`
fn split_entry_url(url: &str) -> Option<(&str, &str)> {
    let bytes = url.as_bytes();
    (1..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'/' && bytes[i - 1] != b'\\')
        .map(|i| (&url[..i], &url[i + 1..]))
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(
        &self,
        request: &RpcRequest,
        config: &CallConfig,
    ) -> Result<RpcResponse, TransportError> {
        self.calls.lock().await.push((request.clone(), *config));

        let attempts = config.retries.max(1);
        let mut attempt = 1;
        loop {
            let Some(error) = self.failures.lock().await.pop_front() else {
                break;
            };
            if attempt >= attempts {
                return Err(error);
            }
            log::debug!(
                "rpc #{} attempt {}/{} failed: {}",
                request.id,
                attempt,
                attempts,
                error
            );
            attempt += 1;
        }

        let mut collections = self.collections.lock().await;
        let result = request
            .params
            .iter()
            .map(|params| match request.method {
                RpcMethod::Get => Self::get(&collections, params),
                RpcMethod::Move => Self::reposition(&mut collections, params),
            })
            .collect();

        Ok(RpcResponse {
            id: request.id,
            result,
        })
    }
}
