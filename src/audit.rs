//! Thin helper for constructing and appending `persistence::AuditEvent`s
//! with a consistent `event_type` naming scheme, used by every module
//! that needs to leave an audit trail entry (agent updates, identity
//! resolution, dialectic transitions, knowledge mutations).

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::ids::IdentityId;
use crate::persistence::{AuditEvent, AuditStore};

pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, event_type: &str, identity_id: Option<IdentityId>, payload: Value) -> Result<()> {
        self.store.append(AuditEvent::new(event_type, identity_id, payload)).await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        self.store.recent(limit).await
    }

    pub async fn for_identity(&self, identity_id: IdentityId, limit: usize) -> Result<Vec<AuditEvent>> {
        self.store.for_identity(identity_id, limit).await
    }
}

pub mod event_type {
    pub const IDENTITY_RESOLVED: &str = "identity.resolved";
    pub const IDENTITY_CREATED: &str = "identity.created";
    pub const AGENT_UPDATE: &str = "agent.update";
    pub const AGENT_RESET: &str = "agent.reset";
    pub const DIALECTIC_STARTED: &str = "dialectic.started";
    pub const DIALECTIC_TRANSITIONED: &str = "dialectic.transitioned";
    pub const DIALECTIC_RESOLVED: &str = "dialectic.resolved";
    pub const DIALECTIC_FAILED: &str = "dialectic.failed";
    pub const KNOWLEDGE_STORED: &str = "knowledge.stored";
    pub const KNOWLEDGE_UPDATED: &str = "knowledge.updated";
    pub const THRESHOLDS_CHANGED: &str = "thresholds.changed";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryAuditStore;
    use serde_json::json;

    #[tokio::test]
    async fn record_then_recent_round_trips() {
        let log = AuditLog::new(Arc::new(InMemoryAuditStore::default()));
        let identity_id = IdentityId::new();
        log.record(event_type::AGENT_UPDATE, Some(identity_id), json!({"n": 1}))
            .await
            .unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, event_type::AGENT_UPDATE);
    }

    #[tokio::test]
    async fn for_identity_filters() {
        let log = AuditLog::new(Arc::new(InMemoryAuditStore::default()));
        let a = IdentityId::new();
        let b = IdentityId::new();
        log.record(event_type::AGENT_UPDATE, Some(a), json!({})).await.unwrap();
        log.record(event_type::AGENT_UPDATE, Some(b), json!({})).await.unwrap();

        let for_a = log.for_identity(a, 10).await.unwrap();
        assert_eq!(for_a.len(), 1);
    }
}
