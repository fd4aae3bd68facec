//! Step-to-agent routing.

use conclave_agents::{AgentRegistry, RegisteredAgent};
use conclave_common::TaskStep;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How an agent was chosen for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// The step's role name is in the static role map
    RoleMap,
    /// The step's `assigned_to` is itself a registered agent id
    DirectId,
    /// First enabled agent offering the step's capability
    Capability,
}

/// The result of routing one step.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub agent: RegisteredAgent,
    pub source: RouteSource,
}

/// Resolves which registered agent executes a step.
///
/// Order: role map, then direct agent id, then capability lookup. Disabled
/// agents never qualify.
#[derive(Debug, Clone, Default)]
pub struct StepRouter {
    role_map: HashMap<String, String>,
}

impl StepRouter {
    pub fn new(role_map: HashMap<String, String>) -> Self {
        Self { role_map }
    }

    pub fn role_map(&self) -> &HashMap<String, String> {
        &self.role_map
    }

    pub fn resolve(&self, step: &TaskStep, registry: &AgentRegistry) -> Option<RouteDecision> {
        let enabled = |id: &str| registry.get_agent(id).filter(|a| a.enabled);

        let decision = self
            .role_map
            .get(&step.assigned_to)
            .and_then(|id| enabled(id.as_str()))
            .map(|agent| RouteDecision {
                agent,
                source: RouteSource::RoleMap,
            })
            .or_else(|| {
                enabled(step.assigned_to.as_str()).map(|agent| RouteDecision {
                    agent,
                    source: RouteSource::DirectId,
                })
            })
            .or_else(|| {
                let capability = step.capability.as_deref()?;
                registry
                    .find_agents_by_capability(capability)
                    .into_iter()
                    .next()
                    .map(|agent| RouteDecision {
                        agent,
                        source: RouteSource::Capability,
                    })
            });

        if let Some(ref d) = decision {
            debug!(
                step_id = %step.id,
                agent = %d.agent.id,
                source = ?d.source,
                "Routed step"
            );
        }
        decision
    }
}
