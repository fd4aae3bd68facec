//! Agent registry with capability lookup and lifecycle events.

use crate::agent::Agent;
use conclave_common::{AgentConfigUpdate, ConclaveError, Result};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Registry-owned view of an agent.
#[derive(Debug, Clone)]
pub struct RegisteredAgent {
    pub id: String,
    pub name: String,
    pub description: String,
    /// The live agent
    pub agent: Agent,
    pub capabilities: Vec<String>,
    /// Disabled agents are skipped by capability lookup
    pub enabled: bool,
}

impl RegisteredAgent {
    fn from_agent(agent: Agent) -> Self {
        let config = agent.config();
        Self {
            id: config.id,
            name: config.name,
            description: config.description.unwrap_or_default(),
            capabilities: config.capabilities,
            agent,
            enabled: true,
        }
    }

    fn sync_from_agent(&mut self) {
        let config = self.agent.config();
        self.name = config.name;
        self.description = config.description.unwrap_or_default();
        self.capabilities = config.capabilities;
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryEventKind {
    Registered,
    Unregistered,
    StateChanged,
}

/// Lifecycle event carrying a snapshot of the affected entry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered(RegisteredAgent),
    Unregistered(RegisteredAgent),
    StateChanged(RegisteredAgent),
}

impl RegistryEvent {
    pub fn kind(&self) -> RegistryEventKind {
        match self {
            RegistryEvent::Registered(_) => RegistryEventKind::Registered,
            RegistryEvent::Unregistered(_) => RegistryEventKind::Unregistered,
            RegistryEvent::StateChanged(_) => RegistryEventKind::StateChanged,
        }
    }

    pub fn agent(&self) -> &RegisteredAgent {
        match self {
            RegistryEvent::Registered(a)
            | RegistryEvent::Unregistered(a)
            | RegistryEvent::StateChanged(a) => a,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Tracks known agents in registration order.
///
/// Mutations are serialized by an internal lock; events are emitted after
/// the lock is released.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<Vec<RegisteredAgent>>,
    listeners: Mutex<Vec<(ListenerId, RegistryEventKind, Listener)>>,
    next_listener: AtomicU64,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent. Fails without changes if its id is taken.
    pub fn register_agent(&self, agent: Agent) -> Result<()> {
        let entry = RegisteredAgent::from_agent(agent);
        {
            let mut agents = self.agents.write();
            if agents.iter().any(|a| a.id == entry.id) {
                return Err(ConclaveError::DuplicateAgent(entry.id));
            }
            agents.push(entry.clone());
        }

        info!(
            agent = %entry.id,
            capabilities = ?entry.capabilities,
            "Agent registered"
        );
        self.emit(RegistryEvent::Registered(entry));
        Ok(())
    }

    /// Register several agents, stopping at the first duplicate.
    pub fn register_agents(&self, agents: impl IntoIterator<Item = Agent>) -> Result<()> {
        for agent in agents {
            self.register_agent(agent)?;
        }
        Ok(())
    }

    /// Remove an agent. The agent itself is left running.
    pub fn unregister_agent(&self, id: &str) -> bool {
        let removed = {
            let mut agents = self.agents.write();
            agents
                .iter()
                .position(|a| a.id == id)
                .map(|index| agents.remove(index))
        };

        match removed {
            Some(entry) => {
                info!(agent = %id, "Agent unregistered");
                self.emit(RegistryEvent::Unregistered(entry));
                true
            }
            None => false,
        }
    }

    pub fn get_agent(&self, id: &str) -> Option<RegisteredAgent> {
        self.agents.read().iter().find(|a| a.id == id).cloned()
    }

    pub fn get_all_agents(&self) -> Vec<RegisteredAgent> {
        self.agents.read().clone()
    }

    /// Enabled agents offering `capability`, in registration order.
    pub fn find_agents_by_capability(&self, capability: &str) -> Vec<RegisteredAgent> {
        self.agents
            .read()
            .iter()
            .filter(|a| a.enabled && a.has_capability(capability))
            .cloned()
            .collect()
    }

    pub fn set_agent_enabled(&self, id: &str, enabled: bool) -> bool {
        let changed = {
            let mut agents = self.agents.write();
            agents.iter_mut().find(|a| a.id == id).map(|entry| {
                entry.enabled = enabled;
                entry.clone()
            })
        };

        match changed {
            Some(entry) => {
                info!(agent = %id, enabled, "Agent eligibility changed");
                self.emit(RegistryEvent::StateChanged(entry));
                true
            }
            None => false,
        }
    }

    /// Forward a config update to the live agent and refresh the cached
    /// name, description and capabilities.
    pub fn update_agent_config(&self, id: &str, update: AgentConfigUpdate) -> Result<()> {
        let agent = self
            .get_agent(id)
            .map(|entry| entry.agent)
            .ok_or_else(|| ConclaveError::UnknownAgent(id.to_string()))?;

        agent.update_config(update)?;

        let entry = {
            let mut agents = self.agents.write();
            let entry = agents
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| ConclaveError::UnknownAgent(id.to_string()))?;
            entry.sync_from_agent();
            entry.clone()
        };

        self.emit(RegistryEvent::StateChanged(entry));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Add a listener for one kind of event.
    pub fn on<F>(&self, kind: RegistryEventKind, listener: F) -> ListenerId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, Arc::new(listener)));
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    fn emit(&self, event: RegistryEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| l.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| (*listener)(&event))).is_err() {
                error!(
                    agent = %event.agent().id,
                    event = ?kind,
                    "Registry listener panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.len())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
