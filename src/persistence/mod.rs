//! Persistence adapters: trait-based store interfaces plus a usable
//! in-memory implementation of each, so the crate is independently
//! testable without an external database — the same seam-plus-default-
//! impl pattern `ai_session::core` uses for `SessionManager` over
//! `DashMap`.
//!
//! Production deployments swap the in-memory stores for adapters over
//! a real database; only the trait is part of the contract other
//! modules depend on.

mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use memory::{
    InMemoryAgentStateStore, InMemoryAuditStore, InMemoryCalibrationStore,
    InMemoryDialecticStore, InMemoryIdentityStore, InMemoryKnowledgeStore,
};

use crate::agent::AgentStateSnapshot;
use crate::calibration::CalibrationTable;
use crate::dialectic::DialecticSession;
use crate::error::Result;
use crate::ids::{DialecticSessionId, DiscoveryId, IdentityId};
use crate::identity::IdentityRecord;
use crate::knowledge::{Discovery, Edge};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub identity_id: Option<IdentityId>,
    pub event_type: String,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<String>, identity_id: Option<IdentityId>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            identity_id,
            event_type: event_type.into(),
            payload,
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync + Debug {
    async fn get(&self, id: IdentityId) -> Result<Option<IdentityRecord>>;
    async fn find_by_label(&self, label: &str) -> Result<Vec<IdentityRecord>>;
    async fn put(&self, record: IdentityRecord) -> Result<()>;
}

#[async_trait]
pub trait AgentStateStore: Send + Sync + Debug {
    async fn get(&self, id: IdentityId) -> Result<Option<AgentStateSnapshot>>;
    async fn put(&self, snapshot: AgentStateSnapshot) -> Result<()>;
}

#[async_trait]
pub trait DialecticStore: Send + Sync + Debug {
    async fn get(&self, id: DialecticSessionId) -> Result<Option<DialecticSession>>;
    async fn put(&self, session: DialecticSession) -> Result<()>;
    async fn list_for_identity(&self, identity_id: IdentityId) -> Result<Vec<DialecticSession>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync + Debug {
    async fn append(&self, event: AuditEvent) -> Result<()>;
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>>;
    async fn for_identity(&self, identity_id: IdentityId, limit: usize) -> Result<Vec<AuditEvent>>;
}

#[async_trait]
pub trait CalibrationStore: Send + Sync + Debug {
    async fn get_global(&self) -> Result<CalibrationTable>;
    async fn put_global(&self, table: CalibrationTable) -> Result<()>;
    async fn get_for_agent(&self, identity_id: IdentityId) -> Result<CalibrationTable>;
    async fn put_for_agent(&self, identity_id: IdentityId, table: CalibrationTable) -> Result<()>;
}

#[async_trait]
pub trait KnowledgeStoreBackend: Send + Sync + Debug {
    async fn get(&self, id: DiscoveryId) -> Result<Option<Discovery>>;
    async fn put(&self, discovery: Discovery) -> Result<()>;
    async fn edges_from(&self, id: DiscoveryId) -> Result<Vec<Edge>>;
    async fn edges_to(&self, id: DiscoveryId) -> Result<Vec<Edge>>;
    async fn add_edge(&self, edge: Edge) -> Result<()>;
    async fn by_tag(&self, tag: &str) -> Result<Vec<Discovery>>;
    async fn all(&self) -> Result<Vec<Discovery>>;
}
