//! End-to-end scenarios driven entirely through `GovernanceCore`'s
//! public tool-backing methods rather than the dispatcher, exercising
//! the facade directly without going through transport.

use std::collections::HashSet;

use aegis_core::agent::AgentReport;
use aegis_core::config::GovernanceConfig;
use aegis_core::dialectic::CandidateProfile;
use aegis_core::dynamics::EthicalDrift;
use aegis_core::dynamics::Basin;
use aegis_core::governance::Verdict;
use aegis_core::identity::TrustTier;
use aegis_core::knowledge::DiscoveryType;
use aegis_core::GovernanceCore;

fn clean_report(complexity: f64, confidence: f64) -> AgentReport {
    AgentReport {
        complexity,
        confidence,
        response_text: "wrote docs".into(),
        parameters: None,
        ethical_drift: Some(EthicalDrift([0.0, 0.0, 0.0])),
    }
}

/// New agent, first checkin, approve path.
#[tokio::test]
async fn scenario_a_new_agent_first_checkin_proceeds() {
    let core = GovernanceCore::new(GovernanceConfig::default());

    let onboarded = core.onboard("session-alice", Some("alice"), None).await.unwrap();
    assert!(onboarded.api_key_issued.is_some(), "new identities get a one-time API key");

    let envelope = core
        .process_agent_update(onboarded.identity_id, clean_report(0.5, 0.9))
        .await
        .unwrap();

    assert_eq!(envelope.update_count, 1);
    assert_eq!(envelope.verdict, Verdict::Proceed);
}

/// Two sessions claim the same name; the second is
/// refused without leaking anything about the first.
#[tokio::test]
async fn scenario_b_second_claim_of_same_name_is_refused_opaquely() {
    let core = GovernanceCore::new(GovernanceConfig::default());

    let first = core.onboard("session-a", Some("alice"), None).await.unwrap();
    assert!(first.api_key_issued.is_some());

    let second = core.onboard("session-b", Some("alice"), None).await;
    assert!(second.is_err());
    let err = second.unwrap_err();
    assert_eq!(err.code(), aegis_core::error::ErrorCode::IdentityInUse);
    // The opaque error carries no identity_id, session_key, or API key
    // belonging to the first session.
    assert!(!err.to_string().contains(&first.identity_id.to_string()));
}

/// Sustained ethical drift eventually forces a pause.
#[tokio::test]
async fn scenario_c_sustained_drift_forces_pause() {
    let core = GovernanceCore::new(GovernanceConfig::default());
    let onboarded = core.onboard("session-drift", Some("drifter"), None).await.unwrap();

    let drifting = AgentReport {
        complexity: 0.9,
        confidence: 0.95,
        response_text: "pushing through".into(),
        parameters: None,
        ethical_drift: Some(EthicalDrift([0.4, 0.4, 0.4])),
    };

    let mut last = None;
    for _ in 0..30 {
        let envelope = core
            .process_agent_update(onboarded.identity_id, drifting.clone())
            .await
            .unwrap();
        last = Some(envelope);
    }

    let last = last.unwrap();
    assert!(last.void_active || last.void_warning, "30 high-drift updates should push |V| past the soft threshold");
    assert!(
        matches!(last.verdict, Verdict::Pause | Verdict::Reject),
        "expected pause/reject, got {:?}",
        last.verdict
    );
    assert!(matches!(last.basin, Basin::Low | Basin::Boundary | Basin::High));
}

/// Calibration correction pulls reported confidence down
/// once ground truth shows most of the recent window was wrong.
#[tokio::test]
async fn scenario_d_calibration_correction_reweights_confidence() {
    let core = GovernanceCore::new(GovernanceConfig::default());
    let onboarded = core.onboard("session-calib", Some("calib"), None).await.unwrap();

    // 50 checkins in the [0.8, 0.9) confidence bin.
    for _ in 0..50 {
        core.process_agent_update(onboarded.identity_id, clean_report(0.3, 0.85))
            .await
            .unwrap();
    }

    // External ground truth: only 20 of the last 50 were actually correct.
    for i in 0..50 {
        core.calibration_update_ground_truth(onboarded.identity_id, 0.85, i < 20)
            .await
            .unwrap();
    }

    let checked = core.calibration_check(onboarded.identity_id, 0.85).await.unwrap();
    let corrected = checked.get("value").and_then(|v| v.as_f64()).unwrap();
    assert!(
        (corrected - 0.4).abs() < 0.05,
        "expected corrected confidence near 0.4, got {corrected}"
    );

    // At 20/50 = 0.4, confidence is below the gate threshold (0.8), so
    // the 51st checkin must NOT skip the lambda1 adaptive step on
    // account of the raw reported value alone once corrected — but the
    // gate itself reads the *raw* reported confidence, so
    // what matters here is that the envelope surfaces the corrected
    // value distinct from the raw 0.85 report.
    let envelope = core
        .process_agent_update(onboarded.identity_id, clean_report(0.3, 0.85))
        .await
        .unwrap();
    let corrected_confidence = envelope.corrected_confidence.unwrap();
    assert!(
        (corrected_confidence - 0.4).abs() < 0.05,
        "51st checkin should couple I-dynamics at the corrected confidence, not the raw 0.85"
    );
}

/// Dialectic resolution after a pause.
#[tokio::test]
async fn scenario_e_dialectic_resolves_after_pause() {
    let core = GovernanceCore::new(GovernanceConfig::default());
    let paused = core.onboard("session-paused", Some("paused-agent"), None).await.unwrap();
    let reviewer = core.onboard("session-reviewer", Some("reviewer"), None).await.unwrap();
    core.set_trust_tier(reviewer.identity_id, TrustTier::T2).await.unwrap();

    let candidates = vec![CandidateProfile {
        identity_id: reviewer.identity_id,
        trust_tier: TrustTier::T2,
        health: 0.9,
        track_record: 0.9,
        domain_match: 0.7,
        last_reviewed_at: None,
        recent_review_targets: Vec::new(),
        currently_in_active_dialectic: false,
    }];

    let session_id = core
        .request_dialectic_review(paused.identity_id, "drift concerns".into(), &candidates, None)
        .await
        .unwrap();

    let session = core.dialectic_get(session_id).await.unwrap();
    assert_eq!(session.reviewer_identity_id, Some(reviewer.identity_id));

    core.submit_thesis(
        session_id,
        paused.identity_id,
        "the drift came from an overcorrected ethics vector".into(),
        vec!["resume once drift flattens".into()],
    )
    .await
    .unwrap();

    core.submit_antithesis(
        session_id,
        reviewer.identity_id,
        "I'm concerned the drift will recur".into(),
        vec!["resume once drift flattens".into()],
    )
    .await
    .unwrap();

    let resolved = core
        .submit_synthesis(session_id, reviewer.identity_id, "agreed, resume".into(), vec![], true)
        .await
        .unwrap();

    assert_eq!(resolved.phase, aegis_core::dialectic::DialecticPhase::Resolved);

    // A synthesis-summary discovery was stored and is attributed to
    // the paused agent's current label.
    let found = core
        .search_knowledge_graph("dialectic resolved", None, 0.0, 10)
        .await
        .unwrap();
    assert!(!found.is_empty(), "expected the resolution summary to be searchable");
}

/// Knowledge store round trip, used as connective tissue for the
/// dialectic resolution test above and a direct exercise of the
/// gateway independent of the dialectic engine.
#[tokio::test]
async fn leave_note_round_trips_through_details() {
    let core = GovernanceCore::new(GovernanceConfig::default());
    let author = core.onboard("session-author", Some("author"), None).await.unwrap();

    let discovery_id = core
        .knowledge_store(
            author.identity_id,
            DiscoveryType::Insight,
            "found a race".into(),
            "details about the race".into(),
            HashSet::from(["concurrency".to_string()]),
        )
        .await
        .unwrap();

    let details = core.knowledge_details(discovery_id).await.unwrap();
    assert_eq!(
        details.get("discovery").unwrap().get("summary").unwrap().as_str().unwrap(),
        "found a race"
    );
    assert_eq!(details.get("author_display_label").unwrap().as_str().unwrap(), "author");
}
