//! Search ranking: blends an externally delegated similarity score
//! with an in-scope connectivity prior and recency tie-break.
//! `SimilaritySource` is the delegation seam; embedding computation
//! and semantic ranking themselves are out of scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::DiscoveryId;

use super::Discovery;

#[async_trait]
pub trait SimilaritySource: Send + Sync {
    /// Similarity of `query` to each candidate, same order as input,
    /// values in `[0, 1]`.
    async fn score(&self, query: &str, candidates: &[Discovery]) -> Vec<f64>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub discovery_id: DiscoveryId,
    pub blended_score: f64,
    pub similarity: f64,
}

const CONNECTIVITY_WEIGHT: f64 = 0.25;
const SIMILARITY_WEIGHT: f64 = 0.75;
/// Soft cap used to normalize inbound edge count into `[0, 1]` before
/// blending; a discovery with this many or more inbound edges is
/// treated as maximally connected.
const CONNECTIVITY_SATURATION: f64 = 20.0;

pub async fn rank(
    candidates: Vec<Discovery>,
    query: &str,
    min_similarity: f64,
    top_k: usize,
    similarity_source: Option<&dyn SimilaritySource>,
) -> Result<Vec<SearchResult>> {
    let similarities = match similarity_source {
        Some(source) => source.score(query, &candidates).await,
        // No external similarity source configured: treat every
        // candidate as equally (zero) similar, so ranking degrades to
        // pure connectivity + recency.
        None => vec![0.0; candidates.len()],
    };

    let mut scored: Vec<(Discovery, f64, f64)> = candidates
        .into_iter()
        .zip(similarities)
        .filter(|(_, sim)| *sim >= min_similarity)
        .map(|(d, sim)| {
            let connectivity = (d.inbound_edge_count as f64 / CONNECTIVITY_SATURATION).min(1.0);
            let blended = SIMILARITY_WEIGHT * sim + CONNECTIVITY_WEIGHT * connectivity;
            (d, blended, sim)
        })
        .collect();

    scored.sort_by(|(a, a_score, _), (b, b_score, _)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });

    Ok(scored
        .into_iter()
        .take(top_k)
        .map(|(d, blended, sim)| SearchResult {
            discovery_id: d.discovery_id,
            blended_score: blended,
            similarity: sim,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdentityId;
    use crate::knowledge::{DiscoveryStatus, DiscoveryType};
    use std::collections::HashSet;

    fn discovery(inbound: u64) -> Discovery {
        Discovery {
            discovery_id: DiscoveryId::new(),
            author_identity_id: IdentityId::new(),
            author_label_snapshot: "a".into(),
            discovery_type: DiscoveryType::Note,
            summary: "s".into(),
            detail: "d".into(),
            tags: HashSet::new(),
            created_at: chrono::Utc::now(),
            status: DiscoveryStatus::Open,
            embedding_vector: None,
            inbound_edge_count: inbound,
        }
    }

    #[tokio::test]
    async fn higher_connectivity_wins_at_equal_similarity() {
        let low = discovery(0);
        let high = discovery(20);
        let low_id = low.discovery_id;
        let high_id = high.discovery_id;

        let results = rank(vec![low, high], "q", 0.0, 10, None).await.unwrap();
        assert_eq!(results[0].discovery_id, high_id);
        assert_eq!(results[1].discovery_id, low_id);
    }

    #[tokio::test]
    async fn min_similarity_filters_candidates() {
        struct FixedSimilarity(Vec<f64>);
        #[async_trait]
        impl SimilaritySource for FixedSimilarity {
            async fn score(&self, _query: &str, _candidates: &[Discovery]) -> Vec<f64> {
                self.0.clone()
            }
        }

        let a = discovery(0);
        let b = discovery(0);
        let source = FixedSimilarity(vec![0.9, 0.1]);
        let results = rank(vec![a, b], "q", 0.5, 10, Some(&source)).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
