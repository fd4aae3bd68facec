//! Agent configuration and the response-generation seam.
//!
//! These live in `conclave-common` so that both the agents crate and the
//! coordinator can implement or consume them without circular dependencies.

use crate::{Message, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Channel agents join when none is configured.
pub const DEFAULT_CHANNEL: &str = "general";

/// Declarative description of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Agent ID, unique within a registry
    pub id: String,

    /// Human-readable name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Channel the agent subscribes to and broadcasts on
    #[serde(default = "default_channel")]
    pub team_channel: String,

    /// Capability tags used for step assignment
    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub default_tools: Vec<String>,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: format!("agent-{}", uuid::Uuid::new_v4()),
            name: "Agent".into(),
            description: None,
            team_channel: default_channel(),
            capabilities: Vec::new(),
            default_tools: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.team_channel = channel.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Merge a partial update. The id is never changed.
    pub fn apply(&mut self, update: AgentConfigUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(channel) = update.team_channel {
            self.team_channel = channel;
        }
        if let Some(capabilities) = update.capabilities {
            self.capabilities = capabilities;
        }
        if let Some(tools) = update.default_tools {
            self.default_tools = tools;
        }
    }
}

/// Partial update for an [`AgentConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub team_channel: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub default_tools: Option<Vec<String>>,
}

impl AgentConfigUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn team_channel(channel: impl Into<String>) -> Self {
        Self {
            team_channel: Some(channel.into()),
            ..Default::default()
        }
    }

    pub fn capabilities<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: Some(capabilities.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }
}

/// Produces an agent's output from its buffered context.
///
/// This is the only point where agents differ in behavior. Implementations
/// may be static templates, rules, or remote model calls.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Turn the concatenated message buffer into a response.
    async fn generate_response(&self, config: &AgentConfig, context: &str) -> Result<String>;

    /// Answer an `information_request` addressed to this agent.
    ///
    /// `Some` is sent back to the requester as a correlated
    /// `information_response`; `None` only logs the request.
    fn on_information_request(&self, _config: &AgentConfig, _message: &Message) -> Option<Value> {
        None
    }
}

#[async_trait]
impl<T: ResponseGenerator + ?Sized> ResponseGenerator for Arc<T> {
    async fn generate_response(&self, config: &AgentConfig, context: &str) -> Result<String> {
        (**self).generate_response(config, context).await
    }

    fn on_information_request(&self, config: &AgentConfig, message: &Message) -> Option<Value> {
        (**self).on_information_request(config, message)
    }
}

#[async_trait]
impl ResponseGenerator for Box<dyn ResponseGenerator> {
    async fn generate_response(&self, config: &AgentConfig, context: &str) -> Result<String> {
        (**self).generate_response(config, context).await
    }

    fn on_information_request(&self, config: &AgentConfig, message: &Message) -> Option<Value> {
        (**self).on_information_request(config, message)
    }
}
