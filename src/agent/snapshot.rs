//! The agent state snapshot and its bounded history ring.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dynamics::{Phase, StateVector, Theta};
use crate::governance::Verdict;
use crate::ids::IdentityId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub identity_id: IdentityId,
    pub recorded_at: DateTime<Utc>,
    pub state: StateVector,
    pub theta: Theta,
    pub update_count: u64,
    pub last_verdict: Option<Verdict>,
    pub phase: Phase,
}

impl AgentStateSnapshot {
    pub fn new(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            recorded_at: Utc::now(),
            state: StateVector::initial(),
            theta: Theta::default(),
            update_count: 0,
            last_verdict: None,
            phase: Phase::Integration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at_seq: u64,
    pub v: f64,
    pub coherence: f64,
    pub phi: f64,
    pub verdict: Verdict,
}

/// Bounded history ring for one agent: keeps the last `capacity`
/// entries, dropping the oldest once full.
#[derive(Debug, Clone)]
pub struct AgentHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl AgentHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity_hint(&self) -> usize {
        self.capacity
    }
}
