//! MB-SMF Consumer Configuration
//!
//! Read from the `mbsmf` section of a YAML document, or from the whole
//! document when there is no such section.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{MbsmfError, MbsmfResult};

/// Section name looked up in configuration documents
pub const CONFIG_SECTION: &str = "mbsmf";

fn default_max_sessions() -> usize {
    256
}

/// Local server receiving status notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationServer {
    /// `scheme://authority[/prefix]` the notification URIs are built on
    pub api_root: String,
}

impl NotificationServer {
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            api_root: api_root.into(),
        }
    }
}

/// Consumer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbsmfConfig {
    /// Maximum number of sessions a context holds
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Send session body changes as PATCH instead of dropping them
    #[serde(default)]
    pub session_body_patch: bool,
    #[serde(default)]
    pub notification_servers: Vec<NotificationServer>,
}

impl Default for MbsmfConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            session_body_patch: false,
            notification_servers: Vec::new(),
        }
    }
}

impl MbsmfConfig {
    /// Build from an already parsed YAML node
    pub fn from_yaml_value(value: &Value) -> MbsmfResult<Self> {
        let section = value.get(CONFIG_SECTION).unwrap_or(value);
        let config: Self = if section.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(section.clone())?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> MbsmfResult<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_yaml_value(&value)
    }

    pub fn from_file(path: impl AsRef<Path>) -> MbsmfResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading configuration from {}", path.as_ref().display());
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> MbsmfResult<()> {
        if self.max_sessions == 0 {
            return Err(MbsmfError::Config("max_sessions must be positive".to_string()));
        }
        for server in &self.notification_servers {
            let root = server.api_root.as_str();
            if !(root.starts_with("http://") || root.starts_with("https://")) {
                return Err(MbsmfError::Config(format!(
                    "notification server api_root '{root}' is not an http(s) URI"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MbsmfConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, MbsmfConfig::default());
        assert_eq!(config.max_sessions, 256);
        assert!(!config.session_body_patch);
    }

    #[test]
    fn test_section_lookup() {
        let yaml = r#"
logger:
  level: debug
mbsmf:
  max_sessions: 8
  session_body_patch: true
  notification_servers:
    - api_root: http://127.0.0.5:7777
"#;
        let config = MbsmfConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_sessions, 8);
        assert!(config.session_body_patch);
        assert_eq!(
            config.notification_servers,
            vec![NotificationServer::new("http://127.0.0.5:7777")]
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            MbsmfConfig::from_yaml_str("max_sessions: 0"),
            Err(MbsmfError::Config(_))
        ));
        assert!(MbsmfConfig::from_yaml_str(
            "notification_servers:\n  - api_root: 127.0.0.1:7777\n"
        )
        .is_err());
        assert!(matches!(
            MbsmfConfig::from_yaml_str("max_sessions: [1"),
            Err(MbsmfError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MbsmfConfig::from_file("/nonexistent/mbsmf.yaml"),
            Err(MbsmfError::Io(_))
        ));
    }
}
