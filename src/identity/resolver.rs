//! Four-path identity resolution: session cache -> durable
//! session -> label claim -> create new. Every path funnels through
//! `resolve` so callers cannot distinguish a cache hit from a durable
//! hit except by latency.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use aegis_session::{SessionCache, SharedSessionStore};

use crate::error::{GovernanceError, Result};
use crate::ids::IdentityId;
use crate::persistence::IdentityStore;

use super::IdentityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPath {
    SessionCache,
    DurableSession,
    LabelClaim,
    Created,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub identity_id: IdentityId,
    pub path: ResolutionPath,
    /// Present only when `path == Created`: the one-time API key.
    pub api_key_issued: Option<String>,
}

fn mint_api_key() -> String {
    format!("sk-{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn today_ymd() -> String {
    chrono::Utc::now().format("%Y%m%d").to_string()
}

fn default_label() -> String {
    let suffix: String = {
        let mut rng = rand::rng();
        (0..6)
            .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
            .collect()
    };
    format!("agent-{}-{}", today_ymd(), suffix)
}

pub struct IdentityResolver {
    cache: Arc<SessionCache>,
    sessions: SharedSessionStore,
    identities: Arc<dyn IdentityStore>,
    idle_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(
        cache: Arc<SessionCache>,
        sessions: SharedSessionStore,
        identities: Arc<dyn IdentityStore>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            sessions,
            identities,
            idle_timeout,
        }
    }

    /// Resolve `session_key` to an `identity_id`, claiming `name` or
    /// creating a fresh identity as needed. `api_key` is required to
    /// claim an existing label; ignored for paths
    /// 1/2/4.
    #[instrument(skip(self, api_key), fields(session_key = %session_key))]
    pub async fn resolve(
        &self,
        session_key: &str,
        name: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<ResolveOutcome> {
        // Path 1: session cache.
        if let Some(identity_uuid) = self.cache.get(session_key) {
            let _ = self.sessions.touch(session_key, self.idle_timeout);
            return Ok(ResolveOutcome {
                identity_id: IdentityId::from(identity_uuid),
                path: ResolutionPath::SessionCache,
                api_key_issued: None,
            });
        }

        // Path 2: durable session store.
        if let Some(binding) = self.sessions.get(session_key) {
            if !binding.is_expired(chrono::Utc::now()) {
                self.cache.insert(session_key.to_string(), binding.identity_id);
                let _ = self.sessions.touch(session_key, self.idle_timeout);
                return Ok(ResolveOutcome {
                    identity_id: IdentityId::from(binding.identity_id),
                    path: ResolutionPath::DurableSession,
                    api_key_issued: None,
                });
            }
        }

        // Path 3: label claim.
        if let Some(label) = name {
            let matches = self.identities.find_by_label(label).await?;
            match matches.len() {
                0 => {} // fall through to create.
                1 => {
                    let record = &matches[0];
                    if self
                        .sessions
                        .has_active_elsewhere(record.identity_id.as_uuid(), session_key)
                    {
                        // Opaque: never reveal that the identity exists
                        // or which session holds it.
                        return Err(GovernanceError::IdentityInUse);
                    }

                    let provided = api_key.ok_or(GovernanceError::AuthFailed)?;
                    if provided != record.api_key {
                        return Err(GovernanceError::AuthFailed);
                    }

                    self.sessions.bind(
                        session_key.to_string(),
                        record.identity_id.as_uuid(),
                        self.idle_timeout,
                    )?;
                    self.cache.insert(session_key.to_string(), record.identity_id.as_uuid());

                    return Ok(ResolveOutcome {
                        identity_id: record.identity_id,
                        path: ResolutionPath::LabelClaim,
                        api_key_issued: None,
                    });
                }
                _ => {
                    // Two identities sharing one label is a data
                    // integrity problem, not a legitimate ambiguous
                    // claim; don't leak candidates either way.
                    warn!(label, count = matches.len(), "multiple identities share a label");
                    return Err(GovernanceError::AuthFailed);
                }
            }
        }

        // Path 4: create new.
        let label = name.map(str::to_string).unwrap_or_else(default_label);
        let api_key_plain = mint_api_key();
        let record = IdentityRecord::new(label.clone(), api_key_plain.clone());
        let identity_id = record.identity_id;
        self.identities.put(record).await?;

        self.sessions
            .bind(session_key.to_string(), identity_id.as_uuid(), self.idle_timeout)?;
        self.cache.insert(session_key.to_string(), identity_id.as_uuid());

        info!(%identity_id, label, "created new identity");

        Ok(ResolveOutcome {
            identity_id,
            path: ResolutionPath::Created,
            api_key_issued: Some(api_key_plain),
        })
    }
}
