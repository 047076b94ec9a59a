use crate::codec::{JsonCodec, WireCodec};
use crate::decoder::try_decode;
use crate::envelope::Envelope;
use crate::topology::HostAddr;
use crate::transport::Transport;
use crate::tree::Tree;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

/// Sends one envelope to a list of hosts and collects one response tree per host.
#[derive(Clone)]
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn WireCodec>,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_codec(transport, Arc::new(JsonCodec))
    }

    pub fn with_codec(transport: Arc<dyn Transport>, codec: Arc<dyn WireCodec>) -> Self {
        Self { transport, codec }
    }

    /// Result `i` belongs to `hosts[i]`. Every host is tried; failures are
    /// turned into sentinel trees, never into an early return.
    pub async fn broadcast(&self, envelope: &Envelope, hosts: &[HostAddr]) -> Vec<Tree> {
        if hosts.is_empty() {
            return Vec::new();
        }

        let broadcast_id = Uuid::new_v4();
        let payload = self.codec.encode(&envelope.to_tree());
        tracing::debug!(
            %broadcast_id,
            operation = envelope.operation().key(),
            hosts = hosts.len(),
            "broadcasting envelope"
        );

        let calls = hosts.iter().map(|host| {
            let payload = payload.clone();
            async move {
                let outcome = self.transport.send(host, payload).await;
                match try_decode(self.codec.as_ref(), outcome) {
                    Ok(tree) => tree,
                    Err(e) => {
                        tracing::warn!(%broadcast_id, host = %host, error = %e, "no usable agent response");
                        e.sentinel()
                    }
                }
            }
        });

        join_all(calls).await
    }
}
