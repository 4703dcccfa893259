//! In-memory implementations of the persistence traits, `DashMap`-backed
//! in the `AgentPool`/`SessionManager` style.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use super::{AgentStateStore, AuditEvent, AuditStore, CalibrationStore, DialecticStore,
    IdentityStore, KnowledgeStoreBackend};
use crate::agent::AgentStateSnapshot;
use crate::calibration::CalibrationTable;
use crate::dialectic::DialecticSession;
use crate::error::Result;
use crate::ids::{DialecticSessionId, DiscoveryId, IdentityId};
use crate::identity::IdentityRecord;
use crate::knowledge::{Discovery, Edge};

#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    by_id: DashMap<IdentityId, IdentityRecord>,
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get(&self, id: IdentityId) -> Result<Option<IdentityRecord>> {
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn find_by_label(&self, label: &str) -> Result<Vec<IdentityRecord>> {
        Ok(self
            .by_id
            .iter()
            .filter(|e| e.value().label == label)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn put(&self, record: IdentityRecord) -> Result<()> {
        self.by_id.insert(record.identity_id, record);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAgentStateStore {
    by_id: DashMap<IdentityId, AgentStateSnapshot>,
}

#[async_trait]
impl AgentStateStore for InMemoryAgentStateStore {
    async fn get(&self, id: IdentityId) -> Result<Option<AgentStateSnapshot>> {
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn put(&self, snapshot: AgentStateSnapshot) -> Result<()> {
        self.by_id.insert(snapshot.identity_id, snapshot);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDialecticStore {
    by_id: DashMap<DialecticSessionId, DialecticSession>,
}

#[async_trait]
impl DialecticStore for InMemoryDialecticStore {
    async fn get(&self, id: DialecticSessionId) -> Result<Option<DialecticSession>> {
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn put(&self, session: DialecticSession) -> Result<()> {
        self.by_id.insert(session.session_id, session);
        Ok(())
    }

    async fn list_for_identity(&self, identity_id: IdentityId) -> Result<Vec<DialecticSession>> {
        Ok(self
            .by_id
            .iter()
            .filter(|e| {
                e.value().paused_identity_id == identity_id
                    || e.value().reviewer_identity_id == Some(identity_id)
            })
            .map(|e| e.value().clone())
            .collect())
    }
}

/// Append-only, MPMC-safe via `DashMap`'s sharded locking plus a
/// monotonic sequence counter for ordering within a single process.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    events: DashMap<u64, AuditEvent>,
    next_seq: std::sync::atomic::AtomicU64,
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: AuditEvent) -> Result<()> {
        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.events.insert(seq, event);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let mut all: Vec<(u64, AuditEvent)> = self
            .events
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        Ok(all.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    async fn for_identity(&self, identity_id: IdentityId, limit: usize) -> Result<Vec<AuditEvent>> {
        let mut matching: Vec<(u64, AuditEvent)> = self
            .events
            .iter()
            .filter(|e| e.value().identity_id == Some(identity_id))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        matching.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        Ok(matching.into_iter().take(limit).map(|(_, e)| e).collect())
    }
}

/// Global/per-agent calibration tables behind a single `RwLock`-guarded
/// map each — calibration writes are rare (ground-truth updates) next
/// to the read-heavy `process_update` path, so read-write lock over
/// full mutex is the better fit here, unlike the identity/state maps.
#[derive(Debug, Default)]
pub struct InMemoryCalibrationStore {
    global: RwLock<CalibrationTable>,
    per_agent: DashMap<IdentityId, CalibrationTable>,
}

#[async_trait]
impl CalibrationStore for InMemoryCalibrationStore {
    async fn get_global(&self) -> Result<CalibrationTable> {
        Ok(self.global.read().await.clone())
    }

    async fn put_global(&self, table: CalibrationTable) -> Result<()> {
        *self.global.write().await = table;
        Ok(())
    }

    async fn get_for_agent(&self, identity_id: IdentityId) -> Result<CalibrationTable> {
        Ok(self
            .per_agent
            .get(&identity_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn put_for_agent(&self, identity_id: IdentityId, table: CalibrationTable) -> Result<()> {
        self.per_agent.insert(identity_id, table);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    discoveries: DashMap<DiscoveryId, Discovery>,
    edges: DashMap<DiscoveryId, Vec<Edge>>,
}

#[async_trait]
impl KnowledgeStoreBackend for InMemoryKnowledgeStore {
    async fn get(&self, id: DiscoveryId) -> Result<Option<Discovery>> {
        Ok(self.discoveries.get(&id).map(|e| e.value().clone()))
    }

    async fn put(&self, discovery: Discovery) -> Result<()> {
        self.discoveries.insert(discovery.discovery_id, discovery);
        Ok(())
    }

    async fn edges_from(&self, id: DiscoveryId) -> Result<Vec<Edge>> {
        Ok(self.edges.get(&id).map(|e| e.value().clone()).unwrap_or_default())
    }

    async fn edges_to(&self, id: DiscoveryId) -> Result<Vec<Edge>> {
        Ok(self
            .edges
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|edge| edge.target == id)
            .collect())
    }

    async fn add_edge(&self, edge: Edge) -> Result<()> {
        self.edges.entry(edge.source).or_default().push(edge);
        Ok(())
    }

    async fn by_tag(&self, tag: &str) -> Result<Vec<Discovery>> {
        Ok(self
            .discoveries
            .iter()
            .filter(|e| e.value().tags.iter().any(|t| t == tag))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn all(&self) -> Result<Vec<Discovery>> {
        Ok(self.discoveries.iter().map(|e| e.value().clone()).collect())
    }
}
