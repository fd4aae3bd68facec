//! Configuration for the coordinator and the session it runs in.

use conclave_bus::BusConfig;
use conclave_common::{AgentConfig, ConclaveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How the coordinator learns that a delegated step is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Wait for a `result` correlated with the assignment.
    AwaitResult {
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// Treat the step as done after a fixed delay.
    Simulated {
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
    },
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_delay_ms() -> u64 {
    1_000
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        CompletionPolicy::AwaitResult {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl CompletionPolicy {
    pub fn await_result(timeout: Duration) -> Self {
        CompletionPolicy::AwaitResult {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn simulated(delay: Duration) -> Self {
        CompletionPolicy::Simulated {
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// The team leader's own agent config
    #[serde(default = "default_leader")]
    pub leader: AgentConfig,

    #[serde(default)]
    pub completion: CompletionPolicy,

    /// Static role name -> agent id mapping, consulted before capability
    /// lookup
    #[serde(default = "default_role_map")]
    pub role_map: HashMap<String, String>,

    /// Past plans retained in memory
    #[serde(default = "default_max_plan_history")]
    pub max_plan_history: usize,

    #[serde(default)]
    pub bus: BusConfig,

    /// Compose the five-role default team into the session
    #[serde(default = "default_true")]
    pub spawn_default_agents: bool,
}

fn default_leader() -> AgentConfig {
    AgentConfig::new("team-leader", "Team Leader")
        .with_description("Analyzes objectives, plans steps and assigns them to the team")
        .with_capabilities(["task_planning", "team_coordination"])
}

fn default_role_map() -> HashMap<String, String> {
    ["architect", "ui-designer", "frontend-dev", "backend-dev", "qa-tester"]
        .into_iter()
        .map(|role| (role.to_string(), role.to_string()))
        .collect()
}

fn default_max_plan_history() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            leader: default_leader(),
            completion: CompletionPolicy::default(),
            role_map: default_role_map(),
            max_plan_history: default_max_plan_history(),
            bus: BusConfig::default(),
            spawn_default_agents: true,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded coordinator config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.leader.id.trim().is_empty() {
            return Err(ConclaveError::Config("leader.id must not be empty".into()));
        }
        if self.leader.team_channel.trim().is_empty() {
            return Err(ConclaveError::Config(
                "leader.team_channel must not be empty".into(),
            ));
        }
        if self.bus.history_limit == 0 {
            return Err(ConclaveError::Config(
                "bus.history_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
