//! gridhub.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::Capabilities;
use crate::types::NodeId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Strict mode: report an empty pool or a missing capability as an
    /// error instead of a warning.
    #[serde(default = "default_true")]
    pub throw_on_capability_not_present: bool,
    #[serde(default)]
    pub policy: PolicyKind,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            throw_on_capability_not_present: true,
            policy: PolicyKind::default(),
        }
    }
}

/// Ordering applied to candidate nodes before asking them for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Lowest load first, longest idle first on ties.
    #[default]
    LeastLoaded,
    /// Rotate through the fleet regardless of load.
    RoundRobin,
}

impl PolicyKind {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyKind::LeastLoaded => "least-loaded",
            PolicyKind::RoundRobin => "round-robin",
        }
    }
}

/// A statically declared node, used by the fleet simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: NodeId,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u32,
    #[serde(default)]
    pub capabilities: Vec<Capabilities>,
}

fn default_true() -> bool {
    true
}

fn default_max_sessions() -> u32 {
    5
}

impl HubConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject node declarations the registry could not hold consistently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(ConfigError::Invalid("node id must not be empty".to_string()));
            }
            if node.max_sessions == 0 {
                return Err(ConfigError::Invalid(format!(
                    "node {} declares max_sessions = 0",
                    node.id
                )));
            }
            if !seen.insert(&node.id) {
                return Err(ConfigError::Invalid(format!("duplicate node id {}", node.id)));
            }
        }
        Ok(())
    }

    /// Scaffold a config with one local chrome/firefox node.
    pub fn scaffold() -> Self {
        HubConfig {
            hub: HubSettings::default(),
            nodes: vec![NodeConfig {
                id: NodeId::new("http://localhost:5555"),
                max_sessions: default_max_sessions(),
                capabilities: vec![
                    Capabilities::new().with("browserName", "chrome"),
                    Capabilities::new().with("browserName", "firefox"),
                ],
            }],
        }
    }
}
