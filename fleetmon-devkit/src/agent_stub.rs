/*!
Stub agent transport for tests without any host agent

Answers every host from a per-host reply table and records each request
it receives so tests can assert on envelopes and targets.
*/

use async_trait::async_trait;
use fleetmon_kernel::transport::{Transport, TransportError};
use fleetmon_kernel::HostAddr;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// What a stubbed host answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Serialized as JSON.
    Json(Value),
    /// Sent as is, for garbage or empty payloads.
    Raw(Vec<u8>),
    /// Connection refused.
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub host: HostAddr,
    pub body: Value,
}

impl RecordedRequest {
    /// The value under `monitorRequest.<key>`, e.g. `commandWotaskd`.
    pub fn request(&self, key: &str) -> Option<&Value> {
        self.body.get("monitorRequest")?.get(key)
    }
}

#[derive(Clone)]
pub struct StubAgent {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    default_reply: Arc<Mutex<Reply>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubAgent {
    /// Every host answers an empty, error-free response until told otherwise.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(HashMap::new())),
            default_reply: Arc::new(Mutex::new(Reply::Json(json!({"monitorResponse": {}})))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_reply(&self, host: &str, reply: Reply) {
        self.replies.lock().insert(host.to_string(), reply);
    }

    pub fn reply_json(&self, host: &str, value: Value) {
        self.set_reply(host, Reply::Json(value));
    }

    pub fn unreachable(&self, host: &str) {
        self.set_reply(host, Reply::Unreachable);
    }

    pub fn set_default_reply(&self, reply: Reply) {
        *self.default_reply.lock() = reply;
    }

    /// Drops per-host replies; hosts fall back to the default reply.
    pub fn reset_replies(&self) {
        self.replies.lock().clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, host: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.host.name == host)
            .cloned()
            .collect()
    }

    /// Host names contacted, in arrival order.
    pub fn contacted_hosts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.host.name.clone()).collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

impl Default for StubAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StubAgent {
    async fn send(&self, host: &HostAddr, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let body = serde_json::from_slice(&payload).unwrap_or(Value::Null);
        self.requests.lock().push(RecordedRequest { host: host.clone(), body });

        let reply = self
            .replies
            .lock()
            .get(&host.name)
            .cloned()
            .unwrap_or_else(|| self.default_reply.lock().clone());
        log::debug!("[stub-agent] {} -> {:?}", host, reply);

        match reply {
            Reply::Json(value) => serde_json::to_vec(&value).map_err(|e| TransportError::Request {
                host: host.to_string(),
                reason: e.to_string(),
            }),
            Reply::Raw(bytes) => Ok(bytes),
            Reply::Unreachable => Err(TransportError::Connect {
                host: host.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}
