//! Knowledge store gateway: discovery CRUD, tag index, rate limiting,
//! and search blending a delegated similarity source with a
//! connectivity prior. The search-ranking-over-embeddings half is out
//! of scope — `SimilaritySource` is the seam an external component
//! plugs into, mirrored on the `KnowledgeStore`-over-trait pattern used
//! for dual in-memory/external backends elsewhere in this codebase.

mod rate_limit;
mod search;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use rate_limit::RateLimiter;
pub use search::{SearchResult, SimilaritySource};

use crate::error::{GovernanceError, Result};
use crate::ids::{DiscoveryId, IdentityId};
use crate::persistence::KnowledgeStoreBackend;

const SUMMARY_MAX_LEN: usize = 280;
const DETAIL_MAX_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryType {
    Note,
    Insight,
    BugFound,
    Improvement,
    Analysis,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryStatus {
    Open,
    Resolved,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    RelatedTo,
    RespondsTo,
    Tagged,
    EvolvedInto,
    References,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: DiscoveryId,
    pub target: DiscoveryId,
    pub edge_type: EdgeType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discovery {
    pub discovery_id: DiscoveryId,
    pub author_identity_id: IdentityId,
    /// The author's label at the time of store, so archived identities
    /// still display sensibly.
    pub author_label_snapshot: String,
    pub discovery_type: DiscoveryType,
    pub summary: String,
    pub detail: String,
    pub tags: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub status: DiscoveryStatus,
    pub embedding_vector: Option<Vec<f32>>,
    pub inbound_edge_count: u64,
}

pub struct KnowledgeStore {
    backend: std::sync::Arc<dyn KnowledgeStoreBackend>,
    rate_limiter: RateLimiter,
    similarity: Option<std::sync::Arc<dyn SimilaritySource>>,
}

impl KnowledgeStore {
    pub fn new(
        backend: std::sync::Arc<dyn KnowledgeStoreBackend>,
        rate_limit_per_hour: u32,
    ) -> Self {
        Self {
            backend,
            rate_limiter: RateLimiter::new(rate_limit_per_hour),
            similarity: None,
        }
    }

    pub fn with_similarity_source(mut self, source: std::sync::Arc<dyn SimilaritySource>) -> Self {
        self.similarity = Some(source);
        self
    }

    #[instrument(skip(self, detail))]
    pub async fn store(
        &self,
        author_identity_id: IdentityId,
        author_label: &str,
        discovery_type: DiscoveryType,
        summary: String,
        detail: String,
        tags: HashSet<String>,
    ) -> Result<DiscoveryId> {
        if summary.len() > SUMMARY_MAX_LEN {
            return Err(GovernanceError::InvalidParameter {
                name: "summary".into(),
                reason: format!("exceeds {SUMMARY_MAX_LEN} chars"),
            });
        }
        if detail.len() > DETAIL_MAX_LEN {
            return Err(GovernanceError::InvalidParameter {
                name: "detail".into(),
                reason: format!("exceeds {DETAIL_MAX_LEN} chars"),
            });
        }

        self.rate_limiter.check_and_record(author_identity_id)?;

        let discovery = Discovery {
            discovery_id: DiscoveryId::new(),
            author_identity_id,
            author_label_snapshot: author_label.to_string(),
            discovery_type,
            summary,
            detail,
            tags,
            created_at: Utc::now(),
            status: DiscoveryStatus::Open,
            embedding_vector: None,
            inbound_edge_count: 0,
        };
        let id = discovery.discovery_id;
        self.backend.put(discovery).await?;
        Ok(id)
    }

    /// Author-only edits (or a trusted role the caller has already
    /// checked); status transitions are validated here, monotonic
    /// `open -> {resolved, archived}`, archived terminal.
    pub async fn update(
        &self,
        discovery_id: DiscoveryId,
        requester: IdentityId,
        new_status: Option<DiscoveryStatus>,
        append_tags: HashSet<String>,
        append_summary: Option<String>,
    ) -> Result<()> {
        let mut discovery = self
            .backend
            .get(discovery_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(discovery_id.to_string()))?;

        if discovery.author_identity_id != requester {
            return Err(GovernanceError::AuthFailed);
        }
        if discovery.status == DiscoveryStatus::Archived {
            return Err(GovernanceError::InvariantViolated(
                "archived discoveries are terminal".into(),
            ));
        }

        if let Some(status) = new_status {
            let valid = matches!(
                (discovery.status, status),
                (DiscoveryStatus::Open, DiscoveryStatus::Resolved)
                    | (DiscoveryStatus::Open, DiscoveryStatus::Archived)
                    | (DiscoveryStatus::Resolved, DiscoveryStatus::Archived)
            );
            if !valid {
                return Err(GovernanceError::InvariantViolated(format!(
                    "invalid status transition {:?} -> {:?}",
                    discovery.status, status
                )));
            }
            discovery.status = status;
        }

        discovery.tags.extend(append_tags);
        if let Some(addition) = append_summary {
            discovery.summary.push_str(" | ");
            discovery.summary.push_str(&addition);
        }

        self.backend.put(discovery).await
    }

    pub async fn details(&self, discovery_id: DiscoveryId) -> Result<DiscoveryDetails> {
        let discovery = self
            .backend
            .get(discovery_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(discovery_id.to_string()))?;
        let inbound = self.backend.edges_to(discovery_id).await?;
        let outbound = self.backend.edges_from(discovery_id).await?;
        Ok(DiscoveryDetails {
            discovery,
            inbound_edges: inbound,
            outbound_edges: outbound,
        })
    }

    /// All stored discoveries, for cleanup sweeps and other callers
    /// that need the full set rather than a tag or similarity filter.
    pub async fn all(&self) -> Result<Vec<Discovery>> {
        self.backend.all().await
    }

    pub async fn add_edge(&self, source: DiscoveryId, target: DiscoveryId, edge_type: EdgeType) -> Result<()> {
        if source == target {
            return Err(GovernanceError::InvalidParameter {
                name: "target".into(),
                reason: "self-loops are not permitted".into(),
            });
        }
        self.backend.add_edge(Edge { source, target, edge_type }).await?;

        if let Some(mut target_discovery) = self.backend.get(target).await? {
            target_discovery.inbound_edge_count += 1;
            self.backend.put(target_discovery).await?;
        }
        Ok(())
    }

    /// `search`: blends the delegated similarity source (if any) with
    /// a connectivity prior (inbound edge count) and breaks ties by
    /// recency.
    pub async fn search(
        &self,
        query: &str,
        tags: Option<&[String]>,
        min_similarity: f64,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let candidates = match tags {
            Some(tags) => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for tag in tags {
                    for d in self.backend.by_tag(tag).await? {
                        if seen.insert(d.discovery_id) {
                            out.push(d);
                        }
                    }
                }
                out
            }
            None => self.backend.all().await?,
        };

        search::rank(candidates, query, min_similarity, top_k, self.similarity.as_deref()).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDetails {
    pub discovery: Discovery,
    pub inbound_edges: Vec<Edge>,
    pub outbound_edges: Vec<Edge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryKnowledgeStore;

    fn store() -> KnowledgeStore {
        KnowledgeStore::new(std::sync::Arc::new(InMemoryKnowledgeStore::default()), 20)
    }

    #[tokio::test]
    async fn store_then_details_round_trips() {
        let ks = store();
        let author = IdentityId::new();
        let id = ks
            .store(
                author,
                "alice",
                DiscoveryType::Note,
                "short summary".into(),
                "longer detail".into(),
                HashSet::new(),
            )
            .await
            .unwrap();

        let details = ks.details(id).await.unwrap();
        assert_eq!(details.discovery.author_label_snapshot, "alice");
        assert_eq!(details.discovery.status, DiscoveryStatus::Open);
    }

    #[tokio::test]
    async fn update_rejects_non_author() {
        let ks = store();
        let author = IdentityId::new();
        let other = IdentityId::new();
        let id = ks
            .store(author, "alice", DiscoveryType::Note, "s".into(), "d".into(), HashSet::new())
            .await
            .unwrap();

        let result = ks
            .update(id, other, Some(DiscoveryStatus::Resolved), HashSet::new(), None)
            .await;
        assert!(matches!(result, Err(GovernanceError::AuthFailed)));
    }

    #[tokio::test]
    async fn archived_is_terminal() {
        let ks = store();
        let author = IdentityId::new();
        let id = ks
            .store(author, "alice", DiscoveryType::Note, "s".into(), "d".into(), HashSet::new())
            .await
            .unwrap();

        ks.update(id, author, Some(DiscoveryStatus::Archived), HashSet::new(), None)
            .await
            .unwrap();
        let result = ks
            .update(id, author, Some(DiscoveryStatus::Resolved), HashSet::new(), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn self_loop_edge_is_rejected() {
        let ks = store();
        let author = IdentityId::new();
        let id = ks
            .store(author, "alice", DiscoveryType::Note, "s".into(), "d".into(), HashSet::new())
            .await
            .unwrap();
        let result = ks.add_edge(id, id, EdgeType::RelatedTo).await;
        assert!(result.is_err());
    }
}
