//! `GovernanceCore`: the facade tying every domain module to a concrete
//! set of stores and exposing one method per tool in the catalog.
//! `dispatch::Dispatcher::with_builtin_tools` wraps this in
//! the registry a transport layer actually calls through.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;

use aegis_session::{LockConfig, LockManager, SessionCache, SessionStore};

use crate::agent::{AgentHistory, AgentMonitor, AgentReport, MetricsEnvelope, MonitorThresholds};
use crate::audit::{event_type, AuditLog};
use crate::calibration::Telemetry;
use crate::config::GovernanceConfig;
use crate::dynamics::{DynamicsParams, PiController};
use crate::dialectic::{select_reviewer, CandidateProfile, DialecticPhase, DialecticSession};
use crate::error::{GovernanceError, Result};
use crate::governance::Verdict;
use crate::identity::{IdentityRecord, IdentityResolver, ResolveOutcome, TrustTier};
use crate::ids::{DialecticSessionId, DiscoveryId, IdentityId};
use crate::knowledge::{DiscoveryType, KnowledgeStore, SearchResult};
use crate::persistence::{
    AgentStateStore, CalibrationStore, DialecticStore, IdentityStore, InMemoryAgentStateStore,
    InMemoryAuditStore, InMemoryCalibrationStore, InMemoryDialecticStore, InMemoryIdentityStore,
    InMemoryKnowledgeStore,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardResult {
    pub identity_id: IdentityId,
    pub client_session_id: String,
    pub api_key_issued: Option<String>,
}

/// Bundle of stores the facade is built from; defaults to the
/// in-memory implementations but every field is swappable for a real
/// backend without touching the domain modules.
pub struct GovernanceCore {
    config: GovernanceConfig,
    resolver: IdentityResolver,
    sessions: Arc<SessionStore>,
    lock_manager: Arc<LockManager>,
    identities: Arc<dyn IdentityStore>,
    agent_states: Arc<dyn AgentStateStore>,
    monitors: DashMap<IdentityId, Arc<AsyncMutex<AgentMonitor>>>,
    calibration: Arc<dyn CalibrationStore>,
    dialectic_store: Arc<dyn DialecticStore>,
    knowledge: KnowledgeStore,
    audit: AuditLog,
}

impl GovernanceCore {
    pub fn new(config: GovernanceConfig) -> Self {
        let identities: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::default());
        Self::with_identity_store(config, identities)
    }

    /// Build with a caller-supplied identity store, everything else
    /// defaulted to the in-memory backends. Lets tests exercise
    /// `GovernanceCore` against a mocked `IdentityStore` without
    /// standing up a real one.
    pub(crate) fn with_identity_store(config: GovernanceConfig, identities: Arc<dyn IdentityStore>) -> Self {
        let agent_states: Arc<dyn AgentStateStore> = Arc::new(InMemoryAgentStateStore::default());
        let audit_store = Arc::new(InMemoryAuditStore::default());
        let calibration: Arc<dyn CalibrationStore> = Arc::new(InMemoryCalibrationStore::default());
        let dialectic_store: Arc<dyn DialecticStore> = Arc::new(InMemoryDialecticStore::default());
        let knowledge_backend = Arc::new(InMemoryKnowledgeStore::default());

        let sessions = Arc::new(SessionStore::new());
        let cache = Arc::new(SessionCache::new());
        let lock_manager = Arc::new(LockManager::new(LockConfig {
            stale_threshold: config.stale_lock_threshold_seconds,
            ..LockConfig::default()
        }));

        let resolver = IdentityResolver::new(
            cache,
            sessions.clone(),
            identities.clone(),
            config.session_idle_timeout_seconds,
        );

        let knowledge =
            KnowledgeStore::new(knowledge_backend, config.knowledge_store_rate_per_hour);

        Self {
            resolver,
            sessions,
            lock_manager,
            identities,
            agent_states,
            monitors: DashMap::new(),
            calibration,
            dialectic_store,
            knowledge,
            audit: AuditLog::new(audit_store),
            config,
        }
    }

    /// Start the background stale-lock sweeper (every 5 minutes).
    /// The caller keeps the returned handle to abort on shutdown.
    pub fn spawn_lock_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.lock_manager.clone().spawn_sweeper(interval)
    }

    fn monitor_thresholds(&self) -> MonitorThresholds {
        MonitorThresholds {
            risk_approve_threshold: self.config.risk_approve_threshold,
            risk_revise_threshold: self.config.risk_revise_threshold,
            coherence_critical_threshold: self.config.coherence_critical_threshold,
            void_max_soft: self.config.void_threshold_initial,
            void_threshold_min: self.config.void_threshold_min,
            void_threshold_max: self.config.void_threshold_max,
            void_hard: 1.0,
            confidence_gate_threshold: self.config.confidence_gate_threshold,
            reject_window: 5,
        }
    }

    fn dynamics_params(&self) -> DynamicsParams {
        DynamicsParams {
            lambda1_min: self.config.lambda1_min,
            lambda1_max: self.config.lambda1_max,
            ..DynamicsParams::default()
        }
    }

    fn pi_controller(&self) -> PiController {
        PiController {
            target_coherence: self.config.target_coherence,
            target_void_freq: self.config.target_void_freq,
            ..PiController::default()
        }
    }

    async fn get_or_create_monitor(&self, identity_id: IdentityId) -> Arc<AsyncMutex<AgentMonitor>> {
        if let Some(existing) = self.monitors.get(&identity_id) {
            return existing.clone();
        }

        let mut monitor = AgentMonitor::new(identity_id, self.config.history_bound_per_agent);
        monitor.set_thresholds(self.monitor_thresholds());
        monitor.set_dynamics_params(self.dynamics_params());
        monitor.set_controller(self.pi_controller());
        if let Ok(Some(record)) = self.identities.get(identity_id).await {
            monitor.set_trust_tier(record.trust_tier);
        }

        let handle = Arc::new(AsyncMutex::new(monitor));
        self.monitors.insert(identity_id, handle.clone());
        handle
    }

    async fn require_trust_tier(&self, identity_id: IdentityId, minimum: TrustTier) -> Result<()> {
        let record = self
            .identities
            .get(identity_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(identity_id.to_string()))?;
        if record.trust_tier < minimum {
            return Err(GovernanceError::AuthFailed);
        }
        Ok(())
    }

    // ---- identity & onboarding -------------------------------------

    #[instrument(skip(self, api_key))]
    pub async fn onboard(
        &self,
        session_key: &str,
        name: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<OnboardResult> {
        let outcome: ResolveOutcome = self.resolver.resolve(session_key, name, api_key).await?;
        self.get_or_create_monitor(outcome.identity_id).await;

        self.audit
            .record(
                event_type::IDENTITY_RESOLVED,
                Some(outcome.identity_id),
                json!({"path": outcome.path}),
            )
            .await?;

        Ok(OnboardResult {
            identity_id: outcome.identity_id,
            client_session_id: session_key.to_string(),
            api_key_issued: outcome.api_key_issued,
        })
    }

    /// `identity(name?)`: same resolution as `onboard`, plus an
    /// explicit label rename when the caller already has an identity
    /// and supplies a new name for it.
    pub async fn set_identity_label(&self, identity_id: IdentityId, new_label: &str) -> Result<()> {
        let mut record = self
            .identities
            .get(identity_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(identity_id.to_string()))?;
        record.label = new_label.to_string();
        self.identities.put(record).await
    }

    pub async fn verify_trajectory_identity(&self, identity_id: IdentityId) -> Result<TrustTier> {
        let record = self
            .identities
            .get(identity_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(identity_id.to_string()))?;
        Ok(record.trust_tier)
    }

    pub async fn set_trust_tier(&self, identity_id: IdentityId, tier: TrustTier) -> Result<()> {
        let mut record = self
            .identities
            .get(identity_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(identity_id.to_string()))?;
        record.trust_tier = tier;
        self.identities.put(record).await?;
        if let Some(monitor) = self.monitors.get(&identity_id) {
            monitor.lock().await.set_trust_tier(tier);
        }
        Ok(())
    }

    // ---- agent updates ----------------------------------------------

    /// `checkin` / `process_agent_update`: acquire the per-identity
    /// lock, advance dynamics, persist the committed snapshot and
    /// calibration table as one logical unit, release.
    #[instrument(skip(self, report))]
    pub async fn process_agent_update(
        &self,
        identity_id: IdentityId,
        report: AgentReport,
    ) -> Result<MetricsEnvelope> {
        let _guard = self.lock_manager.acquire(identity_id.as_uuid()).await?;

        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        let mut monitor = monitor_handle.lock().await;

        let mut calibration = self.calibration.get_for_agent(identity_id).await?;
        let envelope = monitor.process_update(&report, &mut calibration)?;

        self.calibration.put_for_agent(identity_id, calibration).await?;
        self.agent_states.put(monitor.snapshot().clone()).await?;

        self.audit
            .record(
                event_type::AGENT_UPDATE,
                Some(identity_id),
                json!({"verdict": envelope.verdict, "update_count": envelope.update_count}),
            )
            .await?;

        Ok(envelope)
    }

    pub async fn status(&self, identity_id: IdentityId) -> Result<MetricsEnvelope> {
        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        Ok(monitor_handle.lock().await.get_metrics())
    }

    /// `simulate_update`: never acquires the agent lock (no mutation),
    /// but still goes through the monitor's own mutex so a concurrent
    /// `process_agent_update` can't be read mid-commit.
    pub async fn simulate_update(
        &self,
        identity_id: IdentityId,
        report: AgentReport,
    ) -> Result<MetricsEnvelope> {
        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        let monitor = monitor_handle.lock().await;
        let calibration = self.calibration.get_for_agent(identity_id).await?;
        monitor.simulate(&report, &calibration)
    }

    pub async fn get_thresholds(&self, identity_id: IdentityId) -> Result<MonitorThresholds> {
        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        Ok(monitor_handle.lock().await.thresholds())
    }

    /// `set_thresholds`: requires trust tier >= T2.
    pub async fn set_thresholds(
        &self,
        identity_id: IdentityId,
        thresholds: MonitorThresholds,
    ) -> Result<()> {
        self.require_trust_tier(identity_id, TrustTier::T2).await?;
        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        monitor_handle.lock().await.set_thresholds(thresholds);
        self.audit
            .record(event_type::THRESHOLDS_CHANGED, Some(identity_id), json!(thresholds))
            .await
    }

    /// `reset_monitor`: requires trust tier >= T3.
    pub async fn reset_monitor(&self, identity_id: IdentityId) -> Result<()> {
        self.require_trust_tier(identity_id, TrustTier::T3).await?;
        let _guard = self.lock_manager.acquire(identity_id.as_uuid()).await?;
        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        let (previous_snapshot, _previous_history): (_, AgentHistory) =
            monitor_handle.lock().await.reset();
        self.agent_states.put(monitor_handle.lock().await.snapshot().clone()).await?;
        self.audit
            .record(
                event_type::AGENT_RESET,
                Some(identity_id),
                json!({"previous_update_count": previous_snapshot.update_count}),
            )
            .await
    }

    /// `self_recovery`: an agent currently paused may attempt to
    /// resume by submitting a fresh update; resumption itself is
    /// just the verdict the next update cycle produces, so this is a
    /// thin alias over `process_agent_update` kept distinct in the
    /// catalog for discoverability.
    pub async fn self_recovery(
        &self,
        identity_id: IdentityId,
        report: AgentReport,
    ) -> Result<MetricsEnvelope> {
        self.process_agent_update(identity_id, report).await
    }

    pub async fn export(&self, identity_id: IdentityId) -> Result<Value> {
        let monitor_handle = self.get_or_create_monitor(identity_id).await;
        let monitor = monitor_handle.lock().await;
        let history: Vec<_> = monitor.history().entries().iter().cloned().collect();
        Ok(json!({
            "identity_id": identity_id,
            "snapshot": monitor.snapshot(),
            "history": history,
        }))
    }

    // ---- knowledge ----------------------------------------------------

    pub async fn leave_note(&self, author: IdentityId, note: String, tags: HashSet<String>) -> Result<DiscoveryId> {
        let label = self.current_label(author).await?;
        let id = self
            .knowledge
            .store(author, &label, DiscoveryType::Note, note.clone(), note, tags)
            .await?;
        self.audit
            .record(event_type::KNOWLEDGE_STORED, Some(author), json!({"discovery_id": id}))
            .await?;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn knowledge_store(
        &self,
        author: IdentityId,
        discovery_type: DiscoveryType,
        summary: String,
        detail: String,
        tags: HashSet<String>,
    ) -> Result<DiscoveryId> {
        let label = self.current_label(author).await?;
        let id = self
            .knowledge
            .store(author, &label, discovery_type, summary, detail, tags)
            .await?;
        self.audit
            .record(event_type::KNOWLEDGE_STORED, Some(author), json!({"discovery_id": id}))
            .await?;
        Ok(id)
    }

    pub async fn knowledge_update(
        &self,
        discovery_id: DiscoveryId,
        requester: IdentityId,
        new_status: Option<crate::knowledge::DiscoveryStatus>,
        append_tags: HashSet<String>,
        append_summary: Option<String>,
    ) -> Result<()> {
        self.knowledge
            .update(discovery_id, requester, new_status, append_tags, append_summary)
            .await?;
        self.audit
            .record(event_type::KNOWLEDGE_UPDATED, Some(requester), json!({"discovery_id": discovery_id}))
            .await
    }

    pub async fn knowledge_details(&self, discovery_id: DiscoveryId) -> Result<Value> {
        let details = self.knowledge.details(discovery_id).await?;
        let display_label = self.current_label(details.discovery.author_identity_id).await
            .unwrap_or_else(|_| details.discovery.author_label_snapshot.clone());
        Ok(json!({
            "discovery": details.discovery,
            "author_display_label": display_label,
            "inbound_edges": details.inbound_edges,
            "outbound_edges": details.outbound_edges,
        }))
    }

    pub async fn search_knowledge_graph(
        &self,
        query: &str,
        tags: Option<&[String]>,
        min_similarity: f64,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.knowledge.search(query, tags, min_similarity, top_k).await
    }

    /// `knowledge(action="cleanup")`: archive open discoveries with no
    /// inbound edges past `max_age`, a conservative "dead leaf" notion
    /// of staleness in the absence of a more precise definition.
    /// Requires trust tier >= T2.
    pub async fn knowledge_cleanup(
        &self,
        requester: IdentityId,
        max_age: chrono::Duration,
    ) -> Result<usize> {
        self.require_trust_tier(requester, TrustTier::T2).await?;
        let now = Utc::now();
        let mut archived = 0;
        for discovery in self.knowledge.all().await? {
            if discovery.status == crate::knowledge::DiscoveryStatus::Open
                && discovery.inbound_edge_count == 0
                && now.signed_duration_since(discovery.created_at) > max_age
            {
                self.knowledge
                    .update(
                        discovery.discovery_id,
                        discovery.author_identity_id,
                        Some(crate::knowledge::DiscoveryStatus::Archived),
                        HashSet::new(),
                        None,
                    )
                    .await?;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn current_label(&self, identity_id: IdentityId) -> Result<String> {
        let record = self
            .identities
            .get(identity_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(identity_id.to_string()))?;
        Ok(record.label)
    }

    // ---- dialectic ------------------------------------------------------

    /// `request_dialectic_review`: pauses the requester implicitly by
    /// virtue of them already being in `pause`/`reject` (the caller is
    /// expected to check), selects a reviewer from `candidates` (empty
    /// for `self`/`llm` modes, where `reviewer_identity_id` is supplied
    /// directly instead).
    pub async fn request_dialectic_review(
        &self,
        paused_identity_id: IdentityId,
        topic: String,
        candidates: &[CandidateProfile],
        explicit_reviewer: Option<IdentityId>,
    ) -> Result<DialecticSessionId> {
        let reviewer = explicit_reviewer
            .or_else(|| select_reviewer(paused_identity_id, candidates, Utc::now()));

        let session = DialecticSession::new(
            paused_identity_id,
            reviewer,
            topic,
            self.config.dialectic_max_rounds,
        );
        let session_id = session.session_id;
        self.dialectic_store.put(session).await?;

        self.audit
            .record(
                event_type::DIALECTIC_STARTED,
                Some(paused_identity_id),
                json!({"session_id": session_id, "reviewer_identity_id": reviewer}),
            )
            .await?;
        Ok(session_id)
    }

    async fn load_dialectic(&self, session_id: DialecticSessionId) -> Result<DialecticSession> {
        self.dialectic_store
            .get(session_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(session_id.to_string()))
    }

    async fn save_dialectic_and_apply_resolution(&self, mut session: DialecticSession) -> Result<()> {
        match session.phase {
            DialecticPhase::Resolved => {
                let label = self
                    .current_label(session.paused_identity_id)
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                self.knowledge
                    .store(
                        session.paused_identity_id,
                        &label,
                        DiscoveryType::Insight,
                        format!("dialectic resolved: {}", session.topic),
                        session
                            .resolution
                            .clone()
                            .unwrap_or_default(),
                        HashSet::new(),
                    )
                    .await?;
                self.audit
                    .record(
                        event_type::DIALECTIC_RESOLVED,
                        Some(session.paused_identity_id),
                        json!({"session_id": session.session_id}),
                    )
                    .await?;
            }
            DialecticPhase::Failed => {
                self.audit
                    .record(
                        event_type::DIALECTIC_FAILED,
                        Some(session.paused_identity_id),
                        json!({"session_id": session.session_id, "reason": session.resolution}),
                    )
                    .await?;
            }
            _ => {
                self.audit
                    .record(
                        event_type::DIALECTIC_TRANSITIONED,
                        Some(session.paused_identity_id),
                        json!({"session_id": session.session_id, "phase": session.phase}),
                    )
                    .await?;
            }
        }
        session.updated_at = Utc::now();
        self.dialectic_store.put(session).await
    }

    pub async fn submit_thesis(
        &self,
        session_id: DialecticSessionId,
        author: IdentityId,
        body: String,
        key_conditions: Vec<String>,
    ) -> Result<DialecticSession> {
        let mut session = self.load_dialectic(session_id).await?;
        session.submit_thesis(author, body, key_conditions)?;
        let result = session.clone();
        self.save_dialectic_and_apply_resolution(session).await?;
        Ok(result)
    }

    pub async fn submit_antithesis(
        &self,
        session_id: DialecticSessionId,
        author: IdentityId,
        body: String,
        key_conditions: Vec<String>,
    ) -> Result<DialecticSession> {
        let mut session = self.load_dialectic(session_id).await?;
        session.submit_antithesis(author, body, key_conditions)?;
        let result = session.clone();
        self.save_dialectic_and_apply_resolution(session).await?;
        Ok(result)
    }

    pub async fn submit_synthesis(
        &self,
        session_id: DialecticSessionId,
        author: IdentityId,
        body: String,
        key_conditions: Vec<String>,
        agrees: bool,
    ) -> Result<DialecticSession> {
        let mut session = self.load_dialectic(session_id).await?;
        session.submit_synthesis(author, body, key_conditions, agrees)?;
        let result = session.clone();
        self.save_dialectic_and_apply_resolution(session).await?;
        Ok(result)
    }

    /// `dialectic(action="get"|"list")`.
    pub async fn dialectic_get(&self, session_id: DialecticSessionId) -> Result<DialecticSession> {
        self.load_dialectic(session_id).await
    }

    pub async fn dialectic_list_for_identity(&self, identity_id: IdentityId) -> Result<Vec<DialecticSession>> {
        self.dialectic_store.list_for_identity(identity_id).await
    }

    /// Periodic timeout sweep; a caller runs this on an interval
    /// alongside the lock sweeper.
    pub async fn sweep_dialectic_timeouts(&self, identity_id: IdentityId, timeout: chrono::Duration) -> Result<()> {
        for mut session in self.dialectic_store.list_for_identity(identity_id).await? {
            session.check_timeout(timeout);
            self.save_dialectic_and_apply_resolution(session).await?;
        }
        Ok(())
    }

    // ---- calibration ----------------------------------------------------

    pub async fn calibration_check(&self, identity_id: IdentityId, confidence: f64) -> Result<Value> {
        let table = self.calibration.get_for_agent(identity_id).await?;
        let corrected = table.correct(confidence);
        Ok(json!({"value": corrected.value, "insufficient_samples": corrected.insufficient_samples}))
    }

    pub async fn calibration_update_ground_truth(
        &self,
        identity_id: IdentityId,
        confidence: f64,
        was_correct: bool,
    ) -> Result<()> {
        let mut table = self.calibration.get_for_agent(identity_id).await?;
        table.record_ground_truth(confidence, was_correct);
        self.calibration.put_for_agent(identity_id, table).await
    }

    // ---- observe / telemetry --------------------------------------------

    pub async fn observe_agent(&self, identity_id: IdentityId) -> Result<MetricsEnvelope> {
        self.status(identity_id).await
    }

    /// `observe(mode="compare")`: side-by-side metrics for two
    /// identities, grounded on the same read-only path `status` uses
    /// (each monitor's own mutex, no agent lock).
    pub async fn observe_compare(
        &self,
        identity_a: IdentityId,
        identity_b: IdentityId,
    ) -> Result<(MetricsEnvelope, MetricsEnvelope)> {
        let a = self.status(identity_a).await?;
        let b = self.status(identity_b).await?;
        Ok((a, b))
    }

    /// `observe(mode="anomalies")`: every currently loaded monitor
    /// whose last snapshot shows a void warning, a low/boundary basin,
    /// or a pause/reject verdict — a coarse cross-agent scan over the
    /// same in-process monitor registry `process_agent_update` uses.
    pub async fn observe_anomalies(&self) -> Vec<(IdentityId, MetricsEnvelope)> {
        let mut flagged = Vec::new();
        for entry in self.monitors.iter() {
            let identity_id = *entry.key();
            let metrics = entry.value().lock().await.get_metrics();
            let concerning = metrics.void_warning
                || matches!(metrics.basin, crate::dynamics::Basin::Low | crate::dynamics::Basin::Boundary)
                || matches!(metrics.verdict, Verdict::Pause | Verdict::Reject);
            if concerning {
                flagged.push((identity_id, metrics));
            }
        }
        flagged
    }

    pub async fn observe_telemetry(&self, identity_id: IdentityId, samples: &[crate::calibration::ConfidenceSample]) -> Result<Telemetry> {
        let _ = identity_id;
        Ok(Telemetry::compute(samples))
    }

    pub async fn health_check(&self) -> Value {
        json!({
            "status": "ok",
            "aegis_session_version": aegis_session::VERSION,
            "active_monitors": self.monitors.len(),
        })
    }

    pub async fn sweep_expired_sessions(&self) -> usize {
        self.sessions.sweep_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Identities {}

        #[async_trait::async_trait]
        impl IdentityStore for Identities {
            async fn get(&self, id: IdentityId) -> Result<Option<IdentityRecord>>;
            async fn find_by_label(&self, label: &str) -> Result<Vec<IdentityRecord>>;
            async fn put(&self, record: IdentityRecord) -> Result<()>;
        }
    }

    impl std::fmt::Debug for MockIdentities {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockIdentities").finish()
        }
    }

    fn t1_record(identity_id: IdentityId) -> IdentityRecord {
        let mut record = IdentityRecord::new("mocked".into(), "key".into());
        record.identity_id = identity_id;
        record.trust_tier = TrustTier::T1;
        record
    }

    #[tokio::test]
    async fn require_trust_tier_rejects_below_minimum() {
        let identity_id = IdentityId::new();
        let mut mock = MockIdentities::new();
        mock.expect_get()
            .withf(move |id| *id == identity_id)
            .returning(move |_| Ok(Some(t1_record(identity_id))));

        let core = GovernanceCore::with_identity_store(GovernanceConfig::default(), Arc::new(mock));

        let err = core
            .require_trust_tier(identity_id, TrustTier::T2)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AuthFailed);
    }

    #[tokio::test]
    async fn require_trust_tier_passes_at_or_above_minimum() {
        let identity_id = IdentityId::new();
        let mut mock = MockIdentities::new();
        mock.expect_get()
            .withf(move |id| *id == identity_id)
            .returning(move |_| Ok(Some(t1_record(identity_id))));

        let core = GovernanceCore::with_identity_store(GovernanceConfig::default(), Arc::new(mock));

        core.require_trust_tier(identity_id, TrustTier::T1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn require_trust_tier_not_found_surfaces_not_found() {
        let identity_id = IdentityId::new();
        let mut mock = MockIdentities::new();
        mock.expect_get().returning(|_| Ok(None));

        let core = GovernanceCore::with_identity_store(GovernanceConfig::default(), Arc::new(mock));

        let err = core
            .require_trust_tier(identity_id, TrustTier::T1)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NotFound);
    }
}
