//! Builtin tool catalog: wires every `GovernanceCore` method up
//! as a dispatchable tool, grounded in
//! `ai_session::mcp::tools::ToolRegistry::with_builtin_tools`'s pattern
//! of one `Tool` + one closure per registration. `list_tools` and
//! `describe_tool` are not registered here: a transport layer calls
//! `Dispatcher::list_tools`/`get_tool` directly rather than routing
//! introspection through `dispatch()` itself, since a dispatched tool
//! has no natural way to hold a reference back to its own registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::core::GovernanceCore;
use crate::dialectic::CandidateProfile;
use crate::dynamics::{EthicalDrift, ParameterFingerprint};
use crate::error::{GovernanceError, Result};
use crate::identity::TrustTier;
use crate::ids::{DialecticSessionId, DiscoveryId, IdentityId};
use crate::knowledge::DiscoveryType;

use super::registry::{Dispatcher, Tool, ToolContext};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Knowledge-graph and dialectic operations may wait on external
/// search/storage, so they get a longer deadline than plain reads.
const KNOWLEDGE_DIALECTIC_TIMEOUT: Duration = Duration::from_secs(60);

fn missing(name: &str) -> GovernanceError {
    GovernanceError::MissingParameter(name.to_string())
}

fn get_str<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name).and_then(Value::as_str).ok_or_else(|| missing(name))
}

fn get_opt_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn get_f64(args: &Value, name: &str) -> Result<f64> {
    args.get(name).and_then(Value::as_f64).ok_or_else(|| missing(name))
}

fn get_bool(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn get_identity_id(args: &Value, name: &str) -> Result<IdentityId> {
    let raw = get_str(args, name)?;
    IdentityId::parse_str(raw).map_err(|e| GovernanceError::InvalidParameter {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn get_discovery_id(args: &Value, name: &str) -> Result<DiscoveryId> {
    let raw = get_str(args, name)?;
    DiscoveryId::parse_str(raw).map_err(|e| GovernanceError::InvalidParameter {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn get_session_id(args: &Value, name: &str) -> Result<DialecticSessionId> {
    let raw = get_str(args, name)?;
    DialecticSessionId::parse_str(raw).map_err(|e| GovernanceError::InvalidParameter {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn get_string_vec(args: &Value, name: &str) -> Vec<String> {
    args.get(name)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn get_tag_set(args: &Value, name: &str) -> HashSet<String> {
    get_string_vec(args, name).into_iter().collect()
}

fn get_report(args: &Value) -> Result<crate::agent::AgentReport> {
    let parameters = args
        .get("parameters")
        .map(|v| serde_json::from_value::<ParameterFingerprint>(v.clone()))
        .transpose()
        .map_err(|e| GovernanceError::InvalidParameter {
            name: "parameters".into(),
            reason: e.to_string(),
        })?;
    let ethical_drift = args
        .get("ethical_drift")
        .map(|v| serde_json::from_value::<EthicalDrift>(v.clone()))
        .transpose()
        .map_err(|e| GovernanceError::InvalidParameter {
            name: "ethical_drift".into(),
            reason: e.to_string(),
        })?;

    Ok(crate::agent::AgentReport {
        complexity: get_f64(args, "complexity")?,
        confidence: get_f64(args, "confidence")?,
        response_text: get_opt_str(args, "response_text").unwrap_or_default().to_string(),
        parameters,
        ethical_drift,
    })
}

fn discovery_type_from_str(raw: &str) -> Result<DiscoveryType> {
    match raw {
        "note" => Ok(DiscoveryType::Note),
        "insight" => Ok(DiscoveryType::Insight),
        "bug_found" => Ok(DiscoveryType::BugFound),
        "improvement" => Ok(DiscoveryType::Improvement),
        "analysis" => Ok(DiscoveryType::Analysis),
        "pattern" => Ok(DiscoveryType::Pattern),
        other => Err(GovernanceError::InvalidParameter {
            name: "discovery_type".into(),
            reason: format!("unknown discovery type '{other}'"),
        }),
    }
}

fn discovery_status_from_str(raw: &str) -> Result<crate::knowledge::DiscoveryStatus> {
    use crate::knowledge::DiscoveryStatus;
    match raw {
        "open" => Ok(DiscoveryStatus::Open),
        "resolved" => Ok(DiscoveryStatus::Resolved),
        "archived" => Ok(DiscoveryStatus::Archived),
        other => Err(GovernanceError::InvalidParameter {
            name: "status".into(),
            reason: format!("unknown discovery status '{other}'"),
        }),
    }
}

fn simple_tool(name: &str, description: &str, mutates: bool) -> Tool {
    tool_with_timeout(name, description, mutates, DEFAULT_TIMEOUT)
}

fn knowledge_dialectic_tool(name: &str, description: &str, mutates: bool) -> Tool {
    tool_with_timeout(name, description, mutates, KNOWLEDGE_DIALECTIC_TIMEOUT)
}

fn tool_with_timeout(name: &str, description: &str, mutates: bool, timeout: Duration) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({"type": "object"}),
        mutates,
        timeout,
    }
}

/// Build a `Dispatcher` with every tool in the catalog registered
/// against `core`, mirroring `with_builtin_tools`'s one-constructor
/// assembly but against this service's async handler type.
pub fn with_builtin_tools(core: Arc<GovernanceCore>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("onboard", "resolve or create the caller's identity", true),
                Arc::new(move |args, ctx: ToolContext| {
                    let core = core.clone();
                    Box::pin(async move {
                        let name = get_opt_str(&args, "name");
                        let api_key = get_opt_str(&args, "api_key");
                        let result = core.onboard(&ctx.session_key, name, api_key).await?;
                        Ok(json!(result))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("identity", "inspect or rename the caller's identity", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        if let Some(new_label) = get_opt_str(&args, "name") {
                            core.set_identity_label(identity_id, new_label).await?;
                        }
                        let tier = core.verify_trajectory_identity(identity_id).await?;
                        Ok(json!({"identity_id": identity_id, "trust_tier": tier}))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("checkin", "submit an agent update and advance its state", true),
                Arc::new(move |args, ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let report = get_report(&args)?;
                        let envelope = core.process_agent_update(identity_id, report).await?;
                        Ok(super::envelope::Envelope::from_metrics(&envelope, ctx.response_mode).data.unwrap_or(Value::Null))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("status", "read an identity's current metrics without updating it", false),
                Arc::new(move |args, ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let envelope = core.status(identity_id).await?;
                        Ok(super::envelope::Envelope::from_metrics(&envelope, ctx.response_mode).data.unwrap_or(Value::Null))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("simulate_update", "dry-run an update without committing it", false),
                Arc::new(move |args, ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let report = get_report(&args)?;
                        let envelope = core.simulate_update(identity_id, report).await?;
                        Ok(super::envelope::Envelope::from_metrics(&envelope, ctx.response_mode).data.unwrap_or(Value::Null))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("get_thresholds", "read an identity's current monitor thresholds", false),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let thresholds = core.get_thresholds(identity_id).await?;
                        Ok(json!(thresholds))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("set_thresholds", "override an identity's monitor thresholds (trust tier >= T2)", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let thresholds: crate::agent::MonitorThresholds = args
                            .get("thresholds")
                            .cloned()
                            .map(serde_json::from_value)
                            .transpose()
                            .map_err(|e| GovernanceError::InvalidParameter {
                                name: "thresholds".into(),
                                reason: e.to_string(),
                            })?
                            .ok_or_else(|| missing("thresholds"))?;
                        core.set_thresholds(identity_id, thresholds).await?;
                        Ok(Value::Null)
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("reset_monitor", "reset an identity's dynamics state to the initial basin (trust tier >= T3)", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        core.reset_monitor(identity_id).await?;
                        Ok(Value::Null)
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("self_recovery", "attempt to resume a paused identity with a fresh update", true),
                Arc::new(move |args, ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let report = get_report(&args)?;
                        let envelope = core.self_recovery(identity_id, report).await?;
                        Ok(super::envelope::Envelope::from_metrics(&envelope, ctx.response_mode).data.unwrap_or(Value::Null))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("export", "dump an identity's current snapshot and history", false),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        core.export(identity_id).await
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("leave_note", "store a free-form note in the knowledge graph", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let author = get_identity_id(&args, "identity_id")?;
                        let note = get_str(&args, "note")?.to_string();
                        let tags = get_tag_set(&args, "tags");
                        let id = core.leave_note(author, note, tags).await?;
                        Ok(json!({"discovery_id": id}))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("knowledge", "store, update, inspect, or clean up knowledge graph discoveries", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let action = get_str(&args, "action")?;
                        match action {
                            "store" => {
                                let author = get_identity_id(&args, "identity_id")?;
                                let discovery_type = discovery_type_from_str(get_str(&args, "discovery_type")?)?;
                                let summary = get_str(&args, "summary")?.to_string();
                                let detail = get_str(&args, "detail")?.to_string();
                                let tags = get_tag_set(&args, "tags");
                                let id = core.knowledge_store(author, discovery_type, summary, detail, tags).await?;
                                Ok(json!({"discovery_id": id}))
                            }
                            "update" => {
                                let discovery_id = get_discovery_id(&args, "discovery_id")?;
                                let requester = get_identity_id(&args, "identity_id")?;
                                let new_status = get_opt_str(&args, "status")
                                    .map(discovery_status_from_str)
                                    .transpose()?;
                                let append_tags = get_tag_set(&args, "append_tags");
                                let append_summary = get_opt_str(&args, "append_summary").map(str::to_string);
                                core.knowledge_update(discovery_id, requester, new_status, append_tags, append_summary)
                                    .await?;
                                Ok(Value::Null)
                            }
                            "details" => {
                                let discovery_id = get_discovery_id(&args, "discovery_id")?;
                                core.knowledge_details(discovery_id).await
                            }
                            "cleanup" => {
                                let requester = get_identity_id(&args, "identity_id")?;
                                let max_age_days = args.get("max_age_days").and_then(Value::as_i64).unwrap_or(90);
                                let archived = core
                                    .knowledge_cleanup(requester, chrono::Duration::days(max_age_days))
                                    .await?;
                                Ok(json!({"archived": archived}))
                            }
                            other => Err(GovernanceError::InvalidParameter {
                                name: "action".into(),
                                reason: format!("unknown knowledge action '{other}'"),
                            }),
                        }
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("search_knowledge_graph", "search stored discoveries by query and/or tags", false),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let query = get_opt_str(&args, "query").unwrap_or_default().to_string();
                        let tags = if args.get("tags").is_some() {
                            Some(get_string_vec(&args, "tags"))
                        } else {
                            None
                        };
                        let min_similarity = args.get("min_similarity").and_then(Value::as_f64).unwrap_or(0.0);
                        let top_k = args.get("top_k").and_then(Value::as_u64).unwrap_or(10) as usize;
                        let results = core
                            .search_knowledge_graph(&query, tags.as_deref(), min_similarity, top_k)
                            .await?;
                        Ok(json!(results))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("observe", "read an identity's metrics or calibration telemetry", false),
                Arc::new(move |args, ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let mode = get_opt_str(&args, "mode").unwrap_or("agent");
                        match mode {
                            "agent" => {
                                let identity_id = get_identity_id(&args, "identity_id")?;
                                let envelope = core.observe_agent(identity_id).await?;
                                Ok(super::envelope::Envelope::from_metrics(&envelope, ctx.response_mode).data.unwrap_or(Value::Null))
                            }
                            "compare" => {
                                let identity_a = get_identity_id(&args, "identity_id")?;
                                let identity_b = get_identity_id(&args, "other_identity_id")?;
                                let (a, b) = core.observe_compare(identity_a, identity_b).await?;
                                Ok(json!({"a": a, "b": b}))
                            }
                            "anomalies" => {
                                let flagged = core.observe_anomalies().await;
                                let flagged: Vec<Value> = flagged
                                    .into_iter()
                                    .map(|(id, metrics)| json!({"identity_id": id, "metrics": metrics}))
                                    .collect();
                                Ok(json!({"flagged": flagged}))
                            }
                            "telemetry" => {
                                let identity_id = get_identity_id(&args, "identity_id")?;
                                let samples: Vec<crate::calibration::ConfidenceSample> = args
                                    .get("samples")
                                    .cloned()
                                    .map(|v| {
                                        serde_json::from_value::<Vec<(f64, bool)>>(v).map(|raw| {
                                            raw.into_iter()
                                                .map(|(confidence, lambda1_update_skipped)| {
                                                    crate::calibration::ConfidenceSample {
                                                        confidence,
                                                        lambda1_update_skipped,
                                                    }
                                                })
                                                .collect()
                                        })
                                    })
                                    .transpose()
                                    .map_err(|e| GovernanceError::InvalidParameter {
                                        name: "samples".into(),
                                        reason: e.to_string(),
                                    })?
                                    .unwrap_or_default();
                                let telemetry = core.observe_telemetry(identity_id, &samples).await?;
                                Ok(json!(telemetry))
                            }
                            other => Err(GovernanceError::InvalidParameter {
                                name: "mode".into(),
                                reason: format!("unknown observe mode '{other}'"),
                            }),
                        }
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool(
                    "request_dialectic_review",
                    "open a dialectic peer-review session for a paused identity",
                    true,
                ),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let paused_identity_id = get_identity_id(&args, "identity_id")?;
                        let topic = get_str(&args, "topic")?.to_string();
                        let explicit_reviewer = args
                            .get("reviewer_identity_id")
                            .and_then(Value::as_str)
                            .map(IdentityId::parse_str)
                            .transpose()
                            .map_err(|e| GovernanceError::InvalidParameter {
                                name: "reviewer_identity_id".into(),
                                reason: e.to_string(),
                            })?;
                        let candidates: Vec<CandidateProfile> = args
                            .get("candidates")
                            .cloned()
                            .map(serde_json::from_value)
                            .transpose()
                            .map_err(|e| GovernanceError::InvalidParameter {
                                name: "candidates".into(),
                                reason: e.to_string(),
                            })?
                            .unwrap_or_default();
                        let session_id = core
                            .request_dialectic_review(paused_identity_id, topic, &candidates, explicit_reviewer)
                            .await?;
                        Ok(json!({"session_id": session_id}))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("submit_thesis", "submit the paused identity's thesis in a dialectic session", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let session_id = get_session_id(&args, "session_id")?;
                        let author = get_identity_id(&args, "author_identity_id")?;
                        let body = get_str(&args, "body")?.to_string();
                        let key_conditions = get_string_vec(&args, "key_conditions");
                        let session = core.submit_thesis(session_id, author, body, key_conditions).await?;
                        Ok(json!(session))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("submit_antithesis", "submit the reviewer's antithesis in a dialectic session", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let session_id = get_session_id(&args, "session_id")?;
                        let author = get_identity_id(&args, "author_identity_id")?;
                        let body = get_str(&args, "body")?.to_string();
                        let key_conditions = get_string_vec(&args, "key_conditions");
                        let session = core.submit_antithesis(session_id, author, body, key_conditions).await?;
                        Ok(json!(session))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("submit_synthesis", "submit a synthesis round in a dialectic session", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let session_id = get_session_id(&args, "session_id")?;
                        let author = get_identity_id(&args, "author_identity_id")?;
                        let body = get_str(&args, "body")?.to_string();
                        let key_conditions = get_string_vec(&args, "key_conditions");
                        let agrees = get_bool(&args, "agrees", false);
                        let session = core
                            .submit_synthesis(session_id, author, body, key_conditions, agrees)
                            .await?;
                        Ok(json!(session))
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                knowledge_dialectic_tool("dialectic", "get or list dialectic sessions", false),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let action = get_str(&args, "action")?;
                        match action {
                            "get" => {
                                let session_id = get_session_id(&args, "session_id")?;
                                let session = core.dialectic_get(session_id).await?;
                                Ok(json!(session))
                            }
                            "list" => {
                                let identity_id = get_identity_id(&args, "identity_id")?;
                                let sessions = core.dialectic_list_for_identity(identity_id).await?;
                                Ok(json!(sessions))
                            }
                            other => Err(GovernanceError::InvalidParameter {
                                name: "action".into(),
                                reason: format!("unknown dialectic action '{other}'"),
                            }),
                        }
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("calibration", "check or update an identity's calibration table", true),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let action = get_str(&args, "action")?;
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        match action {
                            "check" => {
                                let confidence = get_f64(&args, "confidence")?;
                                core.calibration_check(identity_id, confidence).await
                            }
                            "update" => {
                                let confidence = get_f64(&args, "confidence")?;
                                let was_correct = get_bool(&args, "was_correct", false);
                                core.calibration_update_ground_truth(identity_id, confidence, was_correct)
                                    .await?;
                                Ok(Value::Null)
                            }
                            other => Err(GovernanceError::InvalidParameter {
                                name: "action".into(),
                                reason: format!("unknown calibration action '{other}'"),
                            }),
                        }
                    })
                }),
            )
            .expect("unique tool name");
    }

    {
        let core = core.clone();
        dispatcher
            .register(
                simple_tool("verify_trajectory_identity", "read an identity's current trust tier", false),
                Arc::new(move |args, _ctx| {
                    let core = core.clone();
                    Box::pin(async move {
                        let identity_id = get_identity_id(&args, "identity_id")?;
                        let tier: TrustTier = core.verify_trajectory_identity(identity_id).await?;
                        Ok(json!({"trust_tier": tier}))
                    })
                }),
            )
            .expect("unique tool name");
    }

    dispatcher
        .register(
            simple_tool("health_check", "report process-level health", false),
            Arc::new(move |_args, _ctx| {
                let core = core.clone();
                Box::pin(async move { Ok(core.health_check().await) })
            }),
        )
        .expect("unique tool name");

    dispatcher
}
