use crate::config::TransportConf;
use crate::topology::HostAddr;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out talking to {host}")]
    Timeout { host: String },
    #[error("cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },
    #[error("{host} answered with HTTP {status}")]
    Status { host: String, status: u16 },
    #[error("request to {host} failed: {reason}")]
    Request { host: String, reason: String },
}

impl TransportError {
    pub fn host(&self) -> &str {
        match self {
            TransportError::Timeout { host }
            | TransportError::Connect { host, .. }
            | TransportError::Status { host, .. }
            | TransportError::Request { host, .. } => host,
        }
    }
}

/// One request/response exchange with the agent of a single host.
///
/// Implementations must not share mutable state between concurrent calls:
/// a broadcast issues one `send` per host at the same time.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, host: &HostAddr, payload: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// HTTP POST of the encoded envelope to the agent endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    scheme: String,
    agent_path: String,
}

impl HttpTransport {
    pub fn new(conf: &TransportConf) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .connect_timeout(Duration::from_secs(conf.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            scheme: conf.scheme.clone(),
            agent_path: conf.agent_path.clone(),
        })
    }

    pub fn url_for(&self, host: &HostAddr) -> String {
        format!("{}://{}:{}{}", self.scheme, host.name, host.port, self.agent_path)
    }
}

fn classify(host: &HostAddr, err: reqwest::Error) -> TransportError {
    let host = host.to_string();
    if err.is_timeout() {
        TransportError::Timeout { host }
    } else if err.is_connect() {
        TransportError::Connect { host, reason: err.to_string() }
    } else {
        TransportError::Request { host, reason: err.to_string() }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, host: &HostAddr, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(self.url_for(host))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| classify(host, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                host: host.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(host, e))?;
        Ok(body.to_vec())
    }
}
