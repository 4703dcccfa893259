//! Identity records and the four-path resolution protocol. `IdentityRecord`
//! mirrors `ai_session::AgentIdentity` in spirit — a long-lived record
//! with a mutable label and status — generalized to this service's fields.

mod resolver;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::IdentityId;

pub use resolver::{IdentityResolver, ResolutionPath, ResolveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityStatus {
    Active,
    Paused,
    Archived,
}

/// Behavioral-consistency-derived trust rating.
/// Higher tiers unlock self-review and threshold overrides and get a
/// favorable risk adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustTier {
    T0,
    T1,
    T2,
    T3,
}

impl TrustTier {
    pub fn as_u8(&self) -> u8 {
        match self {
            TrustTier::T0 => 0,
            TrustTier::T1 => 1,
            TrustTier::T2 => 2,
            TrustTier::T3 => 3,
        }
    }
}

impl Default for TrustTier {
    fn default() -> Self {
        TrustTier::T0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: IdentityId,
    pub label: String,
    /// Minted once at creation, returned to the caller exactly then;
    /// afterward only ever verified, never revealed.
    pub api_key: String,
    pub parent_identity_id: Option<IdentityId>,
    pub created_at: DateTime<Utc>,
    pub status: IdentityStatus,
    pub tags: HashSet<String>,
    pub trust_tier: TrustTier,
}

impl IdentityRecord {
    pub fn new(label: String, api_key: String) -> Self {
        Self {
            identity_id: IdentityId::new(),
            label,
            api_key,
            parent_identity_id: None,
            created_at: Utc::now(),
            status: IdentityStatus::Active,
            tags: HashSet::new(),
            trust_tier: TrustTier::default(),
        }
    }
}
