//! Scenario files
//!
//! A scenario describes the sessions and status subscriptions an
//! application wants the MB-SMF to hold:
//!
//! ```yaml
//! client:
//!   session_body_patch: true
//!   notification_servers:
//!     - api_root: http://127.0.0.1:7777
//! sessions:
//!   - name: news
//!     session:
//!       mbsSessionId:
//!         ssm: {sourceIpAddr: {ipv4Addr: 10.0.0.1}, destIpAddr: {ipv4Addr: 232.0.0.1}}
//!       tmgiAllocReq: true
//!       serviceType: BROADCAST
//!     subscriptions:
//!       - eventList: [{eventType: MBS_REL_TMGI_EXPIRY}]
//! ```

use std::path::Path;

use anyhow::{Context as _, Result};
use ogs_mbsmf::{Context, MbsSession, MbsSessionSubscription, MbsmfConfig, SessionKey};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ScenarioSession {
    pub name: String,
    pub session: MbsSession,
    #[serde(default)]
    pub subscriptions: Vec<MbsSessionSubscription>,
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Consumer configuration, same shape as the `mbsmf` config section
    #[serde(default)]
    pub client: Option<serde_yaml::Value>,
    #[serde(default)]
    pub sessions: Vec<ScenarioSession>,
}

impl Scenario {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid scenario")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&content)
    }

    /// Configuration from the `client` section, defaults when absent
    pub fn config(&self) -> Result<MbsmfConfig> {
        match &self.client {
            Some(section) => {
                MbsmfConfig::from_yaml_value(section).context("Invalid client section")
            }
            None => Ok(MbsmfConfig::default()),
        }
    }

    /// Create the sessions and subscriptions in a context
    pub fn load(&self, ctx: &mut Context) -> Result<Vec<(String, SessionKey)>> {
        let mut keys = Vec::with_capacity(self.sessions.len());
        for entry in &self.sessions {
            let key = ctx
                .session_new()
                .with_context(|| format!("Cannot create session '{}'", entry.name))?;
            if let Some(session) = ctx.session_mut(key) {
                session.update(|data| *data = entry.session.clone());
            }
            for subscription in &entry.subscriptions {
                ctx.subscription_add(key, subscription.clone())
                    .with_context(|| format!("Cannot subscribe on session '{}'", entry.name))?;
            }
            log::debug!(
                "Scenario session '{}' loaded as [{key}] with {} subscription(s)",
                entry.name,
                entry.subscriptions.len()
            );
            keys.push((entry.name.clone(), key));
        }
        Ok(keys)
    }
}
