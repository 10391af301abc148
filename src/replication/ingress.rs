//! Client side of the cross-region ingress endpoint.

use async_trait::async_trait;

use crate::region::Region;
use crate::replication::types::ReplicationEnvelope;
use crate::replication::ReplicationError;

/// Delivers a replicated write to another region.
///
/// Implementations do not enforce a deadline; the coordinator wraps every
/// push in its own timeout.
#[async_trait]
pub trait IngressClient: Send + Sync {
    async fn push(&self, target: &Region, envelope: &ReplicationEnvelope) -> Result<(), ReplicationError>;
}

/// JSON-over-HTTP ingress client.
#[derive(Debug, Clone)]
pub struct HttpIngressClient {
    client: reqwest::Client,
    path: String,
}

impl HttpIngressClient {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: path.into(),
        }
    }

    pub fn endpoint(&self, target: &Region) -> String {
        format!("{}{}", target.ingress_url.trim_end_matches('/'), self.path)
    }
}

#[async_trait]
impl IngressClient for HttpIngressClient {
    async fn push(&self, target: &Region, envelope: &ReplicationEnvelope) -> Result<(), ReplicationError> {
        let url = self.endpoint(target);
        let response = self
            .client
            .post(&url)
            .header("x-source-region", envelope.source_region.as_str())
            .json(envelope)
            .send()
            .await
            .map_err(|e| ReplicationError::TargetUnreachable(format!("{}: {}", target.id, e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReplicationError::Rejected(status.as_u16()))
        }
    }
}
