//! Dialectic engine: peer-review state machine. Thesis ->
//! antithesis -> synthesis (looping) -> resolved | failed, plus
//! reviewer selection with anti-collusion exclusion.

mod reviewer;

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

pub use reviewer::{select_reviewer, CandidateProfile, ReviewerMode};

use crate::error::{GovernanceError, Result};
use crate::ids::{DialecticSessionId, IdentityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialecticPhase {
    Thesis,
    Antithesis,
    Synthesis,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub author_identity_id: IdentityId,
    pub phase: DialecticPhase,
    pub body: String,
    pub key_conditions: Vec<String>,
    pub agrees: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialecticSession {
    pub session_id: DialecticSessionId,
    pub paused_identity_id: IdentityId,
    pub reviewer_identity_id: Option<IdentityId>,
    pub phase: DialecticPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub topic: String,
    pub transcript: Vec<Message>,
    pub max_synthesis_rounds: u32,
    pub synthesis_round: u32,
    pub resolution: Option<String>,
}

const WORD_OVERLAP_CONVERGENCE_THRESHOLD: f64 = 0.60;

impl DialecticSession {
    pub fn new(
        paused_identity_id: IdentityId,
        reviewer_identity_id: Option<IdentityId>,
        topic: String,
        max_synthesis_rounds: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: DialecticSessionId::new(),
            paused_identity_id,
            reviewer_identity_id,
            phase: DialecticPhase::Thesis,
            created_at: now,
            updated_at: now,
            topic,
            transcript: Vec::new(),
            max_synthesis_rounds,
            synthesis_round: 0,
            resolution: None,
        }
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout: ChronoDuration) -> bool {
        !matches!(self.phase, DialecticPhase::Resolved | DialecticPhase::Failed)
            && now.signed_duration_since(self.updated_at) > timeout
    }

    fn fail(&mut self, reason: &str) {
        self.phase = DialecticPhase::Failed;
        self.resolution = Some(reason.to_string());
        self.updated_at = Utc::now();
    }

    /// `submit_thesis`: only valid from `Thesis`, only from the paused
    /// agent itself.
    #[instrument(skip(self, body, key_conditions))]
    pub fn submit_thesis(
        &mut self,
        author: IdentityId,
        body: String,
        key_conditions: Vec<String>,
    ) -> Result<()> {
        if self.phase != DialecticPhase::Thesis {
            return Err(GovernanceError::InvariantViolated(format!(
                "submit_thesis called in phase {:?}",
                self.phase
            )));
        }
        if author != self.paused_identity_id {
            return Err(GovernanceError::AuthFailed);
        }

        self.transcript.push(Message {
            author_identity_id: author,
            phase: DialecticPhase::Thesis,
            body,
            key_conditions,
            agrees: false,
            submitted_at: Utc::now(),
        });
        self.phase = DialecticPhase::Antithesis;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `submit_antithesis`: only valid from `Antithesis`, only from the
    /// assigned reviewer.
    pub fn submit_antithesis(
        &mut self,
        author: IdentityId,
        body: String,
        key_conditions: Vec<String>,
    ) -> Result<()> {
        if self.phase != DialecticPhase::Antithesis {
            return Err(GovernanceError::InvariantViolated(format!(
                "submit_antithesis called in phase {:?}",
                self.phase
            )));
        }
        if Some(author) != self.reviewer_identity_id {
            return Err(GovernanceError::AuthFailed);
        }

        self.transcript.push(Message {
            author_identity_id: author,
            phase: DialecticPhase::Antithesis,
            body,
            key_conditions,
            agrees: false,
            submitted_at: Utc::now(),
        });
        self.phase = DialecticPhase::Synthesis;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `submit_synthesis`: alternating submissions from either party
    /// while in `Synthesis`. Convergence is explicit `agrees=true` or
    /// >=60% key-condition word overlap with the other side's most
    /// recent synthesis message; otherwise loops until
    /// `max_synthesis_rounds` is exceeded, then fails.
    pub fn submit_synthesis(
        &mut self,
        author: IdentityId,
        body: String,
        key_conditions: Vec<String>,
        agrees: bool,
    ) -> Result<()> {
        if self.phase != DialecticPhase::Synthesis {
            return Err(GovernanceError::InvariantViolated(format!(
                "submit_synthesis called in phase {:?}",
                self.phase
            )));
        }
        let is_party = author == self.paused_identity_id || Some(author) == self.reviewer_identity_id;
        if !is_party {
            return Err(GovernanceError::AuthFailed);
        }

        let previous_synthesis = self
            .transcript
            .iter()
            .rev()
            .find(|m| m.phase == DialecticPhase::Synthesis);
        let converged = agrees
            || previous_synthesis
                .map(|prev| word_overlap(&prev.key_conditions, &key_conditions) >= WORD_OVERLAP_CONVERGENCE_THRESHOLD)
                .unwrap_or(false);

        self.transcript.push(Message {
            author_identity_id: author,
            phase: DialecticPhase::Synthesis,
            body,
            key_conditions,
            agrees,
            submitted_at: Utc::now(),
        });
        self.synthesis_round += 1;
        self.updated_at = Utc::now();

        if converged {
            self.phase = DialecticPhase::Resolved;
            self.resolution = Some("synthesis converged".to_string());
            info!(session_id = %self.session_id, "dialectic resolved");
        } else if self.synthesis_round >= self.max_synthesis_rounds {
            self.fail("max synthesis rounds exceeded without convergence");
        }

        Ok(())
    }

    pub fn check_timeout(&mut self, timeout: ChronoDuration) {
        if self.is_timed_out(Utc::now(), timeout) {
            self.fail("inactivity timeout");
        }
    }
}

fn tokenize(conditions: &[String]) -> HashSet<String> {
    conditions
        .iter()
        .flat_map(|c| c.split_whitespace())
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Jaccard-style overlap over whitespace/punctuation-tokenized,
/// case-folded key-condition sets.
fn word_overlap(a: &[String], b: &[String]) -> f64 {
    let set_a = tokenize(a);
    let set_b = tokenize(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_state_machine_resolves() {
        let paused = IdentityId::new();
        let reviewer = IdentityId::new();
        let mut session = DialecticSession::new(paused, Some(reviewer), "drift concerns".into(), 5);

        session
            .submit_thesis(paused, "root cause".into(), vec!["resume condition".into()])
            .unwrap();
        assert_eq!(session.phase, DialecticPhase::Antithesis);

        session
            .submit_antithesis(reviewer, "concerns".into(), vec!["resume condition".into()])
            .unwrap();
        assert_eq!(session.phase, DialecticPhase::Synthesis);

        session
            .submit_synthesis(paused, "revised".into(), vec!["resume condition".into()], false)
            .unwrap();
        assert_eq!(session.phase, DialecticPhase::Synthesis);

        session
            .submit_synthesis(reviewer, "agree".into(), vec![], true)
            .unwrap();
        assert_eq!(session.phase, DialecticPhase::Resolved);
    }

    #[test]
    fn out_of_order_submission_is_invariant_violated() {
        let paused = IdentityId::new();
        let reviewer = IdentityId::new();
        let mut session = DialecticSession::new(paused, Some(reviewer), "t".into(), 5);
        let result = session.submit_antithesis(reviewer, "x".into(), vec![]);
        assert!(matches!(result, Err(GovernanceError::InvariantViolated(_))));
    }

    #[test]
    fn exceeding_max_rounds_without_convergence_fails() {
        let paused = IdentityId::new();
        let reviewer = IdentityId::new();
        let mut session = DialecticSession::new(paused, Some(reviewer), "t".into(), 2);
        session.submit_thesis(paused, "t".into(), vec!["a".into()]).unwrap();
        session.submit_antithesis(reviewer, "a".into(), vec!["b".into()]).unwrap();

        session
            .submit_synthesis(paused, "1".into(), vec!["completely".into()], false)
            .unwrap();
        session
            .submit_synthesis(reviewer, "2".into(), vec!["different".into()], false)
            .unwrap();
        assert_eq!(session.phase, DialecticPhase::Failed);
    }

    #[test]
    fn word_overlap_above_threshold_converges() {
        assert!(
            word_overlap(
                &["resume when stable".to_string()],
                &["resume when stable now".to_string()]
            ) >= WORD_OVERLAP_CONVERGENCE_THRESHOLD
        );
    }
}
