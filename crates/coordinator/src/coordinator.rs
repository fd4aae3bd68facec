//! The team-leader coordinator.
//!
//! Owns the plan state machine: the current [`TaskPlan`], a bounded history
//! of past plans, and a [`PendingTask`] record per delegated step. Steps run
//! strictly in array order. Each one is routed to an agent, assigned over the
//! bus and finished according to the configured [`CompletionPolicy`].
//!
//! ```text
//!  objective ──▶ analyze ──▶ TaskPlan ──▶ execute_next / execute_plan
//!                                             │
//!                     ┌───────────────────────┘
//!                     ▼
//!   pending ──▶ in-progress ──▶ route ──▶ task_assignment ──▶ await result
//!                                                                  │
//!                                         completed ◀──────────────┤
//!                                         failed    ◀──────────────┘
//! ```
//!
//! State locks are never held while publishing or awaiting.

use crate::config::{CompletionPolicy, CoordinatorConfig};
use crate::planner::{KeywordPlanner, TaskPlanner};
use crate::routing::StepRouter;
use async_trait::async_trait;
use chrono::Utc;
use conclave_agents::{AgentRegistry, RegisteredAgent};
use conclave_bus::{MessageBus, Subscription};
use conclave_common::{
    AgentConfig, ConclaveError, Message, MessageDraft, MessageType, PendingTask,
    ResponseGenerator, Result, StepOutcome, StepStatus, TaskPlan, TaskProgress, TaskStep,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Default)]
struct PlanState {
    current: Option<TaskPlan>,
    history: VecDeque<TaskPlan>,
    pending: HashMap<String, PendingTask>,
}

impl PlanState {
    /// A step in the current plan, or in an archived one if the plan was
    /// replaced while the step was running.
    fn step_mut(&mut self, step_id: &str) -> Option<&mut TaskStep> {
        self.current
            .iter_mut()
            .chain(self.history.iter_mut())
            .find_map(|plan| plan.step_mut(step_id))
    }
}

/// Decomposes objectives and drives their steps through the team.
pub struct Coordinator {
    leader: AgentConfig,
    bus: MessageBus,
    registry: Arc<AgentRegistry>,
    planner: Arc<dyn TaskPlanner>,
    router: StepRouter,
    completion: CompletionPolicy,
    max_plan_history: usize,
    state: Mutex<PlanState>,
    /// One step executes at a time
    execution: tokio::sync::Mutex<()>,
    status_updates: Mutex<Option<Subscription>>,
}

impl Coordinator {
    pub fn new(
        config: &CoordinatorConfig,
        bus: MessageBus,
        registry: Arc<AgentRegistry>,
    ) -> Result<Arc<Self>> {
        Self::with_planner(config, bus, registry, Arc::new(KeywordPlanner::new()))
    }

    pub fn with_planner(
        config: &CoordinatorConfig,
        bus: MessageBus,
        registry: Arc<AgentRegistry>,
        planner: Arc<dyn TaskPlanner>,
    ) -> Result<Arc<Self>> {
        let coordinator = Arc::new(Self {
            leader: config.leader.clone(),
            bus,
            registry,
            planner,
            router: StepRouter::new(config.role_map.clone()),
            completion: config.completion,
            max_plan_history: config.max_plan_history,
            state: Mutex::new(PlanState::default()),
            execution: tokio::sync::Mutex::new(()),
            status_updates: Mutex::new(None),
        });

        let weak = Arc::downgrade(&coordinator);
        let subscription = coordinator.bus.subscribe(
            coordinator.leader.team_channel.as_str(),
            move |message: &Message| {
                if message.message_type != MessageType::StatusUpdate {
                    return Ok(());
                }
                if let Some(coordinator) = weak.upgrade() {
                    if message.sender_id != coordinator.leader.id {
                        coordinator.apply_status_update(message);
                    }
                }
                Ok(())
            },
        )?;
        *coordinator.status_updates.lock() = Some(subscription);

        info!(
            leader = %coordinator.leader.id,
            channel = %coordinator.leader.team_channel,
            completion = ?coordinator.completion,
            "Coordinator ready"
        );
        Ok(coordinator)
    }

    pub fn leader(&self) -> &AgentConfig {
        &self.leader
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        self.completion
    }

    /// Plan `objective` and make the plan current.
    ///
    /// A previous current plan is archived into the bounded history.
    pub async fn analyze(&self, objective: &str) -> Result<TaskPlan> {
        info!(leader = %self.leader.id, objective = %objective, "Analyzing objective");

        let plan = self.planner.plan(objective).await?;
        {
            let mut state = self.state.lock();
            if let Some(previous) = state.current.take() {
                state.history.push_back(previous);
                while state.history.len() > self.max_plan_history {
                    state.history.pop_front();
                }
            }
            state.pending.clear();
            state.current = Some(plan.clone());
        }

        info!(plan_id = %plan.id, steps = plan.steps.len(), "Task plan created");
        self.announce(
            MessageType::Notification,
            json!(format!(
                "Created task plan for \"{}\" with {} steps",
                plan.objective,
                plan.steps.len()
            )),
        );
        Ok(plan)
    }

    /// Execute one step of the current plan by id.
    pub async fn execute_step(&self, step_id: &str) -> Result<StepOutcome> {
        let _turn = self.execution.lock().await;
        self.run_step(step_id).await
    }

    /// Execute the next pending step and describe what happened.
    pub async fn execute_next(&self) -> String {
        let _turn = self.execution.lock().await;

        let next = {
            let state = self.state.lock();
            state.current.as_ref().map(|plan| {
                (
                    plan.next_pending()
                        .map(|s| (s.id.clone(), s.description.clone())),
                    plan.progress(),
                )
            })
        };

        match next {
            None => "No active plan to execute".to_string(),
            Some((None, progress)) => format!("Plan in progress: {}", progress),
            Some((Some((step_id, description)), _)) => match self.run_step(&step_id).await {
                Ok(outcome) if outcome.success => {
                    format!("Executed step: {}\nResult: {}", description, outcome.message)
                }
                Ok(outcome) => format!("Step failed: {}\nError: {}", description, outcome.message),
                Err(e) => format!("Step failed: {}\nError: {}", description, e),
            },
        }
    }

    /// Execute every remaining pending step of the current plan in order.
    ///
    /// Stops early if the plan is replaced meanwhile.
    pub async fn execute_plan(&self) -> Vec<StepOutcome> {
        let _turn = self.execution.lock().await;

        let Some(plan_id) = self.state.lock().current.as_ref().map(|p| p.id.clone()) else {
            return Vec::new();
        };

        let mut outcomes = Vec::new();
        loop {
            let next = {
                let state = self.state.lock();
                state
                    .current
                    .as_ref()
                    .filter(|plan| plan.id == plan_id)
                    .and_then(|plan| plan.next_pending())
                    .map(|step| step.id.clone())
            };
            let Some(step_id) = next else { break };

            match self.run_step(&step_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(step_id = %step_id, error = %e, "Stopping plan execution");
                    break;
                }
            }
        }

        info!(
            plan_id = %plan_id,
            progress = %self.get_task_progress(),
            "Plan execution finished"
        );
        outcomes
    }

    /// Run an objective to completion.
    ///
    /// If the current plan still has pending steps those are executed
    /// instead and `objective` is ignored.
    pub async fn submit_task(&self, objective: &str) -> Result<TaskProgress> {
        let continuing = self
            .state
            .lock()
            .current
            .as_ref()
            .is_some_and(|plan| plan.has_pending());

        if continuing {
            info!("Plan already active; continuing its pending steps");
        } else {
            self.analyze(objective).await?;
        }

        self.execute_plan().await;
        Ok(self.get_task_progress())
    }

    pub fn get_task_progress(&self) -> TaskProgress {
        self.state
            .lock()
            .current
            .as_ref()
            .map(TaskPlan::progress)
            .unwrap_or_else(TaskProgress::empty)
    }

    pub fn current_plan(&self) -> Option<TaskPlan> {
        self.state.lock().current.clone()
    }

    /// Archived plans, oldest first.
    pub fn plan_history(&self) -> Vec<TaskPlan> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn pending_task(&self, step_id: &str) -> Option<PendingTask> {
        self.state.lock().pending.get(step_id).cloned()
    }

    /// Records for the current plan's delegated steps, by start time.
    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        let mut tasks: Vec<_> = self.state.lock().pending.values().cloned().collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }

    /// Apply an agent's `status_update` to the matching pending record.
    ///
    /// Expects `{"stepId", "status"}` content, with an optional `"error"`.
    /// Only the agent the step was routed to may report on it. Returns false
    /// for unknown steps, foreign senders and illegal transitions. The
    /// coordinator's own verdict still replaces this record when the step
    /// finishes.
    pub fn apply_status_update(&self, message: &Message) -> bool {
        let Some(step_id) = message.content.get("stepId").and_then(Value::as_str) else {
            return false;
        };
        let Some(status) = message
            .content
            .get("status")
            .cloned()
            .and_then(|v| serde_json::from_value::<StepStatus>(v).ok())
        else {
            return false;
        };
        let error = message
            .content
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let mut state = self.state.lock();
        let Some(task) = state.pending.get_mut(step_id) else {
            return false;
        };

        if task.agent_id.as_deref() != Some(message.sender_id.as_str()) {
            warn!(
                step_id = %step_id,
                sender = %message.sender_id,
                assignee = %task.agent_id.as_deref().unwrap_or("unassigned"),
                "Ignored status update from non-assignee"
            );
            return false;
        }

        if !task.finish(status, error) {
            warn!(
                step_id = %step_id,
                from = %task.status,
                to = %status,
                sender = %message.sender_id,
                "Rejected status update"
            );
            return false;
        }

        info!(
            step_id = %step_id,
            status = %status,
            sender = %message.sender_id,
            "Status update applied"
        );
        true
    }

    async fn run_step(&self, step_id: &str) -> Result<StepOutcome> {
        let (step, objective) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let plan = state
                .current
                .as_mut()
                .ok_or_else(|| ConclaveError::UnknownStep(step_id.to_string()))?;
            let objective = plan.objective.clone();
            let step = plan
                .step_mut(step_id)
                .ok_or_else(|| ConclaveError::UnknownStep(step_id.to_string()))?;
            step.transition(StepStatus::InProgress)?;

            let snapshot = step.clone();
            state
                .pending
                .insert(snapshot.id.clone(), PendingTask::start(&snapshot));
            (snapshot, objective)
        };

        info!(step_id = %step.id, description = %step.description, "Executing step");
        self.publish_status(&step, None);

        let outcome = match self.router.resolve(&step, &self.registry) {
            None => {
                let e = ConclaveError::NoAgentForStep(step.description.clone());
                StepOutcome::failure(format!("Step execution failed: {}", e), e.to_string())
            }
            Some(route) => {
                if let Some(task) = self.state.lock().pending.get_mut(&step.id) {
                    task.agent_id = Some(route.agent.id.clone());
                }
                match self.delegate(&step, &route.agent, &objective).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        StepOutcome::failure(format!("Step execution failed: {}", e), e.to_string())
                    }
                }
            }
        };

        let status = if outcome.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        let error = (!outcome.success).then(|| {
            outcome
                .output
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or(outcome.message.as_str())
                .to_string()
        });

        let finished = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some(task) = state.pending.get_mut(&step.id) {
                task.settle(status, error.clone());
            }
            state.step_mut(&step.id).map(|s| {
                if let Err(e) = s.transition(status) {
                    warn!(step_id = %s.id, error = %e, "Step already finished");
                }
                s.clone()
            })
        };

        if let Some(step) = finished {
            self.publish_status(&step, error.as_deref());
        }
        match &error {
            Some(reason) => {
                warn!(step_id = %step.id, error = %reason, "Step failed");
                self.announce(
                    MessageType::Notification,
                    json!(format!("Step \"{}\" failed: {}", step.description, reason)),
                );
            }
            None => info!(step_id = %step.id, "Step completed"),
        }

        Ok(outcome)
    }

    async fn delegate(
        &self,
        step: &TaskStep,
        agent: &RegisteredAgent,
        objective: &str,
    ) -> Result<StepOutcome> {
        let channel = agent.agent.config().team_channel;
        let assignment_id = format!("msg-{}", uuid::Uuid::new_v4());
        let assignment = MessageDraft::new(
            MessageType::TaskAssignment,
            self.leader.id.as_str(),
            channel.as_str(),
            json!({
                "stepId": step.id,
                "description": step.description,
                "planObjective": objective,
                "requiredTools": step.required_tools,
            }),
        )
        .to(agent.id.as_str())
        .with_id(assignment_id.as_str());

        info!(
            step_id = %step.id,
            agent = %agent.id,
            channel = %channel,
            "Assigning step"
        );

        match self.completion {
            CompletionPolicy::Simulated { delay_ms } => {
                self.bus.publish(assignment)?;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                Ok(StepOutcome::success(
                    format!("Step \"{}\" completed by agent {}", step.description, agent.id),
                    json!({
                        "stepId": step.id,
                        "completedBy": agent.id,
                        "timestamp": Utc::now().to_rfc3339(),
                    }),
                ))
            }
            CompletionPolicy::AwaitResult { timeout_ms } => {
                let (tx, rx) = oneshot::channel::<Message>();
                let slot = Mutex::new(Some(tx));
                let expected = assignment_id.clone();

                // Subscribe before publishing so a fast reply is not missed
                let _watch = self.bus.subscribe(channel.as_str(), move |message: &Message| {
                    if message.message_type == MessageType::Result
                        && message.correlation_id.as_deref() == Some(expected.as_str())
                    {
                        if let Some(tx) = slot.lock().take() {
                            let _ = tx.send(message.clone());
                        }
                    }
                    Ok(())
                })?;
                self.bus.publish(assignment)?;

                let reply = match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await
                {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(_)) | Err(_) => {
                        return Err(ConclaveError::Timeout(format!(
                            "agent {} did not report on step \"{}\" within {} ms",
                            agent.id, step.description, timeout_ms
                        )));
                    }
                };
                debug!(step_id = %step.id, reply_id = %reply.id, "Received step result");

                if let Some(err) = reply.content.get("error") {
                    let reason = err
                        .as_str()
                        .map(str::to_owned)
                        .unwrap_or_else(|| err.to_string());
                    return Ok(StepOutcome::failure(
                        format!(
                            "Agent {} reported an error on step \"{}\"",
                            reply.sender_id, step.description
                        ),
                        reason,
                    ));
                }

                Ok(StepOutcome::success(
                    format!("Step \"{}\" completed by agent {}", step.description, reply.sender_id),
                    json!({
                        "stepId": step.id,
                        "completedBy": reply.sender_id,
                        "resultMessageId": reply.id,
                        "response": reply.content,
                    }),
                ))
            }
        }
    }

    fn publish_status(&self, step: &TaskStep, error: Option<&str>) {
        let mut content = json!({
            "stepId": step.id,
            "description": step.description,
            "assignedTo": step.assigned_to,
            "status": step.status,
        });
        if let Some(error) = error {
            content["error"] = json!(error);
        }
        self.announce(MessageType::StatusUpdate, content);
    }

    fn announce(&self, message_type: MessageType, content: Value) {
        let draft = MessageDraft::new(
            message_type,
            self.leader.id.as_str(),
            self.leader.team_channel.as_str(),
            content,
        );
        if let Err(e) = self.bus.publish(draft) {
            warn!(error = %e, message_type = %message_type, "Failed to publish coordinator message");
        }
    }
}

/// Lets the team leader be an ordinary [`Agent`](conclave_agents::Agent)
/// driven by this coordinator.
#[async_trait]
impl ResponseGenerator for Coordinator {
    async fn generate_response(&self, _config: &AgentConfig, context: &str) -> Result<String> {
        let active = self
            .state
            .lock()
            .current
            .as_ref()
            .is_some_and(|plan| !plan.is_complete());

        if !active && !context.trim().is_empty() {
            let plan = self.analyze(context.trim()).await?;
            return Ok(format!(
                "Created task plan:\nObjective: {}\nSteps: {}",
                plan.objective,
                plan.steps.len()
            ));
        }

        if active {
            return Ok(self.execute_next().await);
        }

        Ok(format!("Received message: {}", context))
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Coordinator")
            .field("leader", &self.leader.id)
            .field("completion", &self.completion)
            .field("current_plan", &state.current.as_ref().map(|p| &p.id))
            .field("history", &state.history.len())
            .finish()
    }
}
