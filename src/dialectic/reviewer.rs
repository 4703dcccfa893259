//! Reviewer selection: scoring, anti-collusion exclusion, and the
//! auto/self/llm mode split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::TrustTier;
use crate::ids::IdentityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewerMode {
    Auto,
    SelfReview,
    Llm,
}

/// Everything the scorer needs about one reviewer candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub identity_id: IdentityId,
    pub trust_tier: TrustTier,
    /// Recent agent-health coherence in `[0, 1]`.
    pub health: f64,
    /// Fraction of this candidate's past reviews that reached a
    /// `resolved` (vs. `failed`) outcome, in `[0, 1]`.
    pub track_record: f64,
    /// Overlap between the candidate's domain tags and the paused
    /// agent's, in `[0, 1]`.
    pub domain_match: f64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    /// Identities this candidate has reviewed within the last 3
    /// dialectic sessions, most recent first.
    pub recent_review_targets: Vec<IdentityId>,
    pub currently_in_active_dialectic: bool,
}

const WEIGHT_HEALTH: f64 = 0.40;
const WEIGHT_TRACK_RECORD: f64 = 0.30;
const WEIGHT_DOMAIN_MATCH: f64 = 0.20;
const WEIGHT_FRESHNESS: f64 = 0.10;
const ANTI_COLLUSION_LOOKBACK: usize = 3;

/// Freshness penalty: 1.0 for a candidate never having reviewed
/// anyone, decaying toward 0 the more recently they last reviewed.
fn freshness_penalty(last_reviewed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_reviewed_at {
        None => 1.0,
        Some(t) => {
            let hours_since = now.signed_duration_since(t).num_minutes().max(0) as f64 / 60.0;
            (hours_since / 24.0).min(1.0)
        }
    }
}

fn score(candidate: &CandidateProfile, now: DateTime<Utc>) -> f64 {
    WEIGHT_HEALTH * candidate.health
        + WEIGHT_TRACK_RECORD * candidate.track_record
        + WEIGHT_DOMAIN_MATCH * candidate.domain_match
        + WEIGHT_FRESHNESS * freshness_penalty(candidate.last_reviewed_at, now)
}

/// Select a reviewer for `paused_identity_id` out of `candidates`.
/// Excludes self, anyone currently tied up in another active
/// dialectic, and anyone who reviewed this same paused identity
/// within the last `ANTI_COLLUSION_LOOKBACK` sessions. Ties on score
/// break toward the candidate with the older `last_reviewed_at` (more
/// "fresh").
///
/// `Auto` requires at least one trust-tier-eligible (T1+) candidate;
/// `SelfReview` is only offered by the caller when the paused
/// identity's own trust tier is T2+ and is handled by the caller
/// constructing a session with `reviewer_identity_id = None` and the
/// paused identity standing in for itself; `Llm` delegates reviewer
/// identity entirely to an external synthetic identity supplied by
/// the caller. This function only implements the `Auto` selection.
pub fn select_reviewer(
    paused_identity_id: IdentityId,
    candidates: &[CandidateProfile],
    now: DateTime<Utc>,
) -> Option<IdentityId> {
    let mut eligible: Vec<&CandidateProfile> = candidates
        .iter()
        .filter(|c| c.identity_id != paused_identity_id)
        .filter(|c| !c.currently_in_active_dialectic)
        .filter(|c| c.trust_tier >= TrustTier::T1)
        .filter(|c| {
            !c.recent_review_targets
                .iter()
                .take(ANTI_COLLUSION_LOOKBACK)
                .any(|t| *t == paused_identity_id)
        })
        .collect();

    eligible.sort_by(|a, b| {
        score(b, now)
            .partial_cmp(&score(a, now))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.last_reviewed_at.cmp(&b.last_reviewed_at))
    });

    eligible.first().map(|c| c.identity_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_candidate(id: IdentityId) -> CandidateProfile {
        CandidateProfile {
            identity_id: id,
            trust_tier: TrustTier::T1,
            health: 0.8,
            track_record: 0.8,
            domain_match: 0.5,
            last_reviewed_at: None,
            recent_review_targets: Vec::new(),
            currently_in_active_dialectic: false,
        }
    }

    #[test]
    fn excludes_self_and_busy_candidates() {
        let paused = IdentityId::new();
        let busy = IdentityId::new();
        let mut busy_profile = base_candidate(busy);
        busy_profile.currently_in_active_dialectic = true;

        let candidates = vec![base_candidate(paused), busy_profile];
        assert_eq!(select_reviewer(paused, &candidates, Utc::now()), None);
    }

    #[test]
    fn excludes_recent_reviewer_of_same_target_anti_collusion() {
        let paused = IdentityId::new();
        let collusive = IdentityId::new();
        let mut profile = base_candidate(collusive);
        profile.recent_review_targets = vec![paused];

        let candidates = vec![profile];
        assert_eq!(select_reviewer(paused, &candidates, Utc::now()), None);
    }

    #[test]
    fn higher_score_wins() {
        let paused = IdentityId::new();
        let weak = IdentityId::new();
        let strong = IdentityId::new();
        let mut weak_profile = base_candidate(weak);
        weak_profile.health = 0.2;
        let strong_profile = base_candidate(strong);

        let candidates = vec![weak_profile, strong_profile];
        assert_eq!(select_reviewer(paused, &candidates, Utc::now()), Some(strong));
    }

    #[test]
    fn below_t1_trust_tier_is_excluded() {
        let paused = IdentityId::new();
        let candidate_id = IdentityId::new();
        let mut profile = base_candidate(candidate_id);
        profile.trust_tier = TrustTier::T0;

        let candidates = vec![profile];
        assert_eq!(select_reviewer(paused, &candidates, Utc::now()), None);
    }
}
