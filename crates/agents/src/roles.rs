//! The default team roster.
//!
//! Five specialists, each an ordinary [`Agent`] with a role-specific config
//! and a [`TemplateResponder`].

use crate::agent::Agent;
use crate::responders::TemplateResponder;
use conclave_bus::MessageBus;
use conclave_common::{AgentConfig, Result};
use std::sync::Arc;
use tracing::info;

/// Role identifiers used as agent ids in the default roster.
pub mod role {
    pub const ARCHITECT: &str = "architect";
    pub const UI_DESIGNER: &str = "ui-designer";
    pub const FRONTEND_DEV: &str = "frontend-dev";
    pub const BACKEND_DEV: &str = "backend-dev";
    pub const QA_TESTER: &str = "qa-tester";
}

pub fn architect() -> AgentConfig {
    AgentConfig::new(role::ARCHITECT, "Architect")
        .with_description("Plans system structure and picks technologies")
        .with_capabilities(["architecture", "system_design", "technology_selection"])
}

pub fn ui_designer() -> AgentConfig {
    AgentConfig::new(role::UI_DESIGNER, "UI Designer")
        .with_description("Designs interfaces and interaction flows")
        .with_capabilities(["ui_design", "ux", "prototyping"])
}

pub fn frontend_dev() -> AgentConfig {
    AgentConfig::new(role::FRONTEND_DEV, "Frontend Developer")
        .with_description("Builds client-side components")
        .with_capabilities(["frontend_development", "javascript", "react"])
}

pub fn backend_dev() -> AgentConfig {
    AgentConfig::new(role::BACKEND_DEV, "Backend Developer")
        .with_description("Builds services, APIs and storage")
        .with_capabilities(["backend_development", "api_design", "database"])
}

pub fn qa_tester() -> AgentConfig {
    AgentConfig::new(role::QA_TESTER, "QA Tester")
        .with_description("Verifies behavior and automates tests")
        .with_capabilities(["testing", "qa", "automation"])
}

/// Configs for the full default team, in planning order.
pub fn default_roster() -> Vec<AgentConfig> {
    vec![architect(), ui_designer(), frontend_dev(), backend_dev(), qa_tester()]
}

/// Create the default team on `bus`.
pub fn spawn_default_agents(bus: &MessageBus) -> Result<Vec<Agent>> {
    let responder = Arc::new(TemplateResponder::default());
    let agents = default_roster()
        .into_iter()
        .map(|config| Agent::new(config, bus.clone(), responder.clone()))
        .collect::<Result<Vec<_>>>()?;

    info!(count = agents.len(), "Default team spawned");
    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_roster_ids_are_unique() {
        let roster = default_roster();
        let ids: HashSet<_> = roster.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), roster.len());
    }

    #[test]
    fn test_roster_covers_planned_capabilities() {
        let roster = default_roster();
        for capability in [
            "architecture",
            "ui_design",
            "frontend_development",
            "backend_development",
            "database",
            "testing",
        ] {
            assert!(
                roster.iter().any(|c| c.has_capability(capability)),
                "no agent offers {}",
                capability
            );
        }
    }

    #[test]
    fn test_spawn_subscribes_everyone() {
        let bus = MessageBus::default();
        let agents = spawn_default_agents(&bus).unwrap();
        assert_eq!(agents.len(), 5);
        assert_eq!(bus.subscriber_count("general"), 5);
    }
}
