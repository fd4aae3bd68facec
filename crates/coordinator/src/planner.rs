//! Objective decomposition.
//!
//! A [`TaskPlanner`] turns free text into an ordered [`TaskPlan`]. The
//! built-in [`KeywordPlanner`] matches the objective against a fixed
//! keyword table and emits one step per matched capability between a
//! leading analysis step and a trailing verification step.

use async_trait::async_trait;
use conclave_common::{Result, TaskPlan, TaskStep};
use tracing::debug;

pub mod capability {
    pub const ARCHITECTURE: &str = "architecture";
    pub const UI_DESIGN: &str = "ui_design";
    pub const FRONTEND: &str = "frontend_development";
    pub const BACKEND: &str = "backend_development";
    pub const API: &str = "api_development";
    pub const DATABASE: &str = "database";
    pub const TESTING: &str = "testing";
}

/// Keyword -> capability, checked case-insensitively in this order.
const KEYWORDS: &[(&str, &str)] = &[
    ("UI", capability::UI_DESIGN),
    ("界面", capability::UI_DESIGN),
    ("设计", capability::UI_DESIGN),
    ("前端", capability::FRONTEND),
    ("frontend", capability::FRONTEND),
    ("后端", capability::BACKEND),
    ("backend", capability::BACKEND),
    ("API", capability::API),
    ("数据库", capability::DATABASE),
    ("database", capability::DATABASE),
    ("测试", capability::TESTING),
    ("test", capability::TESTING),
    ("架构", capability::ARCHITECTURE),
];

/// Used when no keyword matches.
const BASELINE: &str = capability::FRONTEND;

#[async_trait]
pub trait TaskPlanner: Send + Sync {
    async fn plan(&self, objective: &str) -> Result<TaskPlan>;
}

/// Rule-based planner driven by the keyword table.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPlanner;

impl KeywordPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Capabilities mentioned by `objective`, deduplicated in table order.
    pub fn identify_capabilities(&self, objective: &str) -> Vec<&'static str> {
        let lower = objective.to_lowercase();
        let mut found: Vec<&'static str> = Vec::new();

        for (keyword, capability) in KEYWORDS {
            if lower.contains(&keyword.to_lowercase()) && !found.contains(capability) {
                found.push(capability);
            }
        }

        if found.is_empty() {
            found.push(BASELINE);
        }
        found
    }

    pub fn build_steps(&self, capabilities: &[&str]) -> Vec<TaskStep> {
        let wants = |c: &str| capabilities.contains(&c);
        let mut steps = vec![TaskStep::new("Requirements analysis and task breakdown", "architect")
            .with_capability(capability::ARCHITECTURE)
            .with_tools(["task-analyzer"])
            .with_priority(10)];

        if wants(capability::UI_DESIGN) {
            steps.push(
                TaskStep::new("User interface design", "ui-designer")
                    .with_capability(capability::UI_DESIGN)
                    .with_tools(["ui-design-tool"])
                    .with_priority(8),
            );
        }

        if wants(capability::FRONTEND) {
            steps.push(
                TaskStep::new("Frontend implementation", "frontend-dev")
                    .with_capability(capability::FRONTEND)
                    .with_tools(["code-writer"])
                    .with_priority(6),
            );
        }

        if wants(capability::BACKEND) || wants(capability::API) {
            steps.push(
                TaskStep::new("Backend implementation", "backend-dev")
                    .with_capability(capability::BACKEND)
                    .with_tools(["code-writer"])
                    .with_priority(6),
            );
        }

        if wants(capability::DATABASE) {
            steps.push(
                TaskStep::new("Data model and storage", "backend-dev")
                    .with_capability(capability::DATABASE)
                    .with_tools(["schema-designer"])
                    .with_priority(5),
            );
        }

        steps.push(
            TaskStep::new("Functional testing and quality verification", "qa-tester")
                .with_capability(capability::TESTING)
                .with_tools(["test-runner"])
                .with_priority(4),
        );
        steps
    }
}

#[async_trait]
impl TaskPlanner for KeywordPlanner {
    async fn plan(&self, objective: &str) -> Result<TaskPlan> {
        let capabilities = self.identify_capabilities(objective);
        debug!(capabilities = ?capabilities, "Identified required capabilities");

        Ok(TaskPlan::new(objective, self.build_steps(&capabilities)))
    }
}
