//! Task plan types for agent coordination.

use crate::error::{ConclaveError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle of a single step.
///
/// Legal transitions are `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work inside a [`TaskPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub id: String,

    pub description: String,

    /// Role name or agent id this step is meant for
    pub assigned_to: String,

    /// Capability used for registry lookup when `assigned_to` does not resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tools: Vec<String>,

    /// 1-10, advisory only: execution order is array order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskStep {
    pub fn new(description: impl Into<String>, assigned_to: impl Into<String>) -> Self {
        Self {
            id: format!("step-{}", uuid::Uuid::new_v4()),
            description: description.into(),
            assigned_to: assigned_to.into(),
            capability: None,
            status: StepStatus::Pending,
            required_tools: Vec::new(),
            priority: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority.clamp(1, 10));
        self
    }

    /// Move to `next`, stamping start/end times.
    ///
    /// Rejects anything but the legal forward transitions.
    pub fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ConclaveError::InvalidTransition {
                step_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            StepStatus::InProgress => self.started_at = Some(now),
            StepStatus::Completed | StepStatus::Failed => self.ended_at = Some(now),
            StepStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }
}

/// An objective decomposed into ordered steps.
///
/// The step list is fixed once the plan is built; only step status and
/// timestamps change during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub id: String,
    pub objective: String,
    pub steps: Vec<TaskStep>,
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    pub fn new(objective: impl Into<String>, steps: Vec<TaskStep>) -> Self {
        Self {
            id: format!("plan-{}", uuid::Uuid::new_v4()),
            objective: objective.into(),
            steps,
            created_at: Utc::now(),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut TaskStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// First pending step in array order.
    pub fn next_pending(&self) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    pub fn has_pending(&self) -> bool {
        self.next_pending().is_some()
    }

    /// Every step has reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    pub fn progress(&self) -> TaskProgress {
        TaskProgress::from_steps(&self.steps)
    }
}

/// Aggregate progress of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub completed: usize,
    pub total: usize,
    pub progress: f64,
}

impl TaskProgress {
    pub fn empty() -> Self {
        Self {
            completed: 0,
            total: 0,
            progress: 0.0,
        }
    }

    pub fn from_steps(steps: &[TaskStep]) -> Self {
        let total = steps.len();
        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();

        Self {
            completed,
            total,
            progress: if total > 0 {
                completed as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    pub fn percent(&self) -> u32 {
        (self.progress * 100.0).round() as u32
    }
}

impl fmt::Display for TaskProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} steps completed ({}%)",
            self.completed,
            self.total,
            self.percent()
        )
    }
}

/// Coordinator-side bookkeeping for a delegated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub step_id: String,
    pub description: String,
    pub assigned_to: String,

    /// Agent actually chosen to run the step, once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    pub status: StepStatus,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingTask {
    pub fn start(step: &TaskStep) -> Self {
        Self {
            step_id: step.id.clone(),
            description: step.description.clone(),
            assigned_to: step.assigned_to.clone(),
            agent_id: None,
            status: StepStatus::InProgress,
            started_at: step.started_at.unwrap_or_else(Utc::now),
            ended_at: None,
            error: None,
        }
    }

    /// Record a terminal status. Ignored if already terminal.
    pub fn finish(&mut self, status: StepStatus, error: Option<String>) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.error = error;
        true
    }

    /// Record the coordinator's final verdict for the step.
    ///
    /// Overrides whatever the agent reported so the record always mirrors
    /// the step. `ended_at` is kept when the status does not change.
    pub fn settle(&mut self, status: StepStatus, error: Option<String>) {
        if self.status != status || self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
        self.status = status;
        self.error = error;
    }
}

/// Result of executing one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    pub output: Value,
}

impl StepOutcome {
    pub fn success(message: impl Into<String>, output: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            output,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output: serde_json::json!({ "error": error.into() }),
        }
    }
}
