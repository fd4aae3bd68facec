//! One running coordination session.
//!
//! The session owns the bus, the registry, the coordinator and the team
//! leader agent. Nothing here is global; tests build as many sessions as
//! they like.

use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::planner::{KeywordPlanner, TaskPlanner};
use conclave_agents::{spawn_default_agents, Agent, AgentRegistry};
use conclave_bus::MessageBus;
use conclave_common::{Message, Result, TaskProgress};
use std::sync::Arc;
use tracing::info;

pub struct AgentSession {
    bus: MessageBus,
    registry: Arc<AgentRegistry>,
    coordinator: Arc<Coordinator>,
    leader: Agent,
}

impl AgentSession {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        Self::with_planner(config, Arc::new(KeywordPlanner::new()))
    }

    pub fn with_planner(config: CoordinatorConfig, planner: Arc<dyn TaskPlanner>) -> Result<Self> {
        let bus = MessageBus::new(config.bus.clone());
        let registry = Arc::new(AgentRegistry::new());
        let coordinator = Coordinator::with_planner(&config, bus.clone(), registry.clone(), planner)?;

        // The team leader is an ordinary agent whose responses come from
        // the coordinator.
        let leader = Agent::new(config.leader.clone(), bus.clone(), coordinator.clone())?;
        registry.register_agent(leader.clone())?;

        if config.spawn_default_agents {
            registry.register_agents(spawn_default_agents(&bus)?)?;
        }

        info!(
            leader = %config.leader.id,
            agents = registry.len(),
            "Session started"
        );

        Ok(Self {
            bus,
            registry,
            coordinator,
            leader,
        })
    }

    /// Plan and run an objective; see [`Coordinator::submit_task`].
    pub async fn submit_task(&self, objective: &str) -> Result<TaskProgress> {
        self.coordinator.submit_task(objective).await
    }

    pub fn get_task_progress(&self) -> TaskProgress {
        self.coordinator.get_task_progress()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn leader(&self) -> &Agent {
        &self.leader
    }

    pub fn register_agent(&self, agent: Agent) -> Result<()> {
        self.registry.register_agent(agent)
    }

    pub fn unregister_agent(&self, id: &str) -> bool {
        self.registry.unregister_agent(id)
    }

    pub fn set_agent_enabled(&self, id: &str, enabled: bool) -> bool {
        self.registry.set_agent_enabled(id, enabled)
    }

    /// Everything said on the leader's team channel so far.
    pub fn transcript(&self) -> Vec<Arc<Message>> {
        self.bus
            .channel_history(&self.coordinator.leader().team_channel)
    }

    /// Unsubscribe every registered agent.
    pub fn dispose(&self) {
        for entry in self.registry.get_all_agents() {
            entry.agent.dispose();
        }
        info!("Session disposed");
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("bus", &self.bus)
            .field("registry", &self.registry)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
