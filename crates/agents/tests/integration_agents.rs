//! Integration tests for agents talking over a shared bus.
//!
//! Mock generators count their invocations so tests can check exactly how
//! often each agent produced output.

use async_trait::async_trait;
use conclave_agents::{
    spawn_default_agents, Agent, AgentRegistry, ProcessingPolicy, RegistryEventKind,
};
use conclave_bus::MessageBus;
use conclave_common::{
    AgentConfig, AgentConfigUpdate, ConclaveError, Message, MessageDraft, MessageType,
    ResponseGenerator, Result,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A generator with configurable failure and an invocation counter.
struct CountingGenerator {
    calls: AtomicUsize,
    should_fail: AtomicBool,
    delay: Duration,
}

impl CountingGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            should_fail: AtomicBool::new(false),
            delay: Duration::from_millis(5),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseGenerator for CountingGenerator {
    async fn generate_response(&self, config: &AgentConfig, context: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ConclaveError::Generation(format!("{} failed", config.id)));
        }
        Ok(format!("[{}] {}", config.id, context))
    }
}

async fn wait_for<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

fn results_on(bus: &MessageBus, channel: &str) -> Vec<Arc<Message>> {
    bus.channel_history(channel)
        .into_iter()
        .filter(|m| m.message_type == MessageType::Result)
        .collect()
}

// ============================================================================
// Team behavior
// ============================================================================

#[tokio::test]
async fn test_broadcast_reaches_every_agent_once() {
    let bus = MessageBus::default();
    let generator = Arc::new(CountingGenerator::new());

    let _agents: Vec<Agent> = ["a", "b", "c"]
        .iter()
        .map(|id| {
            Agent::new(AgentConfig::new(*id, *id), bus.clone(), generator.clone()).unwrap()
        })
        .collect();

    bus.publish(MessageDraft::user_input("general", "standup")).unwrap();

    wait_for(|| results_on(&bus, "general").len() == 3).await;
    assert_eq!(generator.calls(), 3);

    // Results from peers never trigger further responses
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(results_on(&bus, "general").len(), 3);
}

#[tokio::test]
async fn test_teams_on_separate_channels_are_isolated() {
    let bus = MessageBus::default();
    let generator = Arc::new(CountingGenerator::new());

    let _frontend = Agent::new(
        AgentConfig::new("fe", "Frontend").with_channel("frontend"),
        bus.clone(),
        generator.clone(),
    )
    .unwrap();
    let _backend = Agent::new(
        AgentConfig::new("be", "Backend").with_channel("backend"),
        bus.clone(),
        generator.clone(),
    )
    .unwrap();

    bus.publish(MessageDraft::user_input("frontend", "build the navbar"))
        .unwrap();

    wait_for(|| results_on(&bus, "frontend").len() == 1).await;
    assert!(results_on(&bus, "backend").is_empty());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_failing_generator_does_not_silence_team() {
    let bus = MessageBus::default();
    let healthy = Arc::new(CountingGenerator::new());
    let broken = Arc::new(CountingGenerator::new());
    broken.should_fail.store(true, Ordering::SeqCst);

    let _ok = Agent::new(AgentConfig::new("ok", "OK"), bus.clone(), healthy.clone()).unwrap();
    let _bad = Agent::new(AgentConfig::new("bad", "Bad"), bus.clone(), broken.clone()).unwrap();

    bus.publish(MessageDraft::user_input("general", "go")).unwrap();

    wait_for(|| results_on(&bus, "general").len() == 2).await;
    let results = results_on(&bus, "general");
    let apology = results.iter().find(|m| m.sender_id == "bad").unwrap();
    assert_eq!(apology.content["error"], json!("Response generation failed: bad failed"));
    let fine = results.iter().find(|m| m.sender_id == "ok").unwrap();
    assert_eq!(fine.text(), Some("[ok] go"));
    assert_eq!(bus.failed_deliveries(), 0);
}

#[tokio::test]
async fn test_batching_agent_beside_eager_agent() {
    let bus = MessageBus::default();
    let generator = Arc::new(CountingGenerator::new());

    let _eager = Agent::new(AgentConfig::new("eager", "Eager"), bus.clone(), generator.clone())
        .unwrap();
    let batcher = Agent::with_policy(
        AgentConfig::new("batch", "Batch"),
        bus.clone(),
        generator.clone(),
        ProcessingPolicy::Batch { threshold: 2 },
    )
    .unwrap();

    bus.publish(MessageDraft::user_input("general", "one")).unwrap();
    wait_for(|| results_on(&bus, "general").len() == 1).await;
    assert_eq!(batcher.buffered_len(), 1);

    bus.publish(MessageDraft::user_input("general", "two")).unwrap();
    wait_for(|| results_on(&bus, "general").len() == 3).await;

    let batched = results_on(&bus, "general")
        .into_iter()
        .find(|m| m.sender_id == "batch")
        .unwrap();
    assert_eq!(batched.text(), Some("[batch] one\ntwo"));
}

#[tokio::test]
async fn test_assignments_to_one_agent_only() {
    let bus = MessageBus::default();
    let generator = Arc::new(CountingGenerator::new());
    let _a = Agent::new(AgentConfig::new("a", "A"), bus.clone(), generator.clone()).unwrap();
    let _b = Agent::new(AgentConfig::new("b", "B"), bus.clone(), generator.clone()).unwrap();

    let assignment = bus
        .publish(
            MessageDraft::new(
                MessageType::TaskAssignment,
                "team-leader",
                "general",
                json!({ "stepId": "s", "description": "Write docs" }),
            )
            .to("b"),
        )
        .unwrap();

    wait_for(|| results_on(&bus, "general").len() == 1).await;
    let result = &results_on(&bus, "general")[0];
    assert_eq!(result.sender_id, "b");
    assert_eq!(result.correlation_id.as_deref(), Some(assignment.id.as_str()));
    assert_eq!(generator.calls(), 1);
}

// ============================================================================
// Registry with the default roster
// ============================================================================

#[tokio::test]
async fn test_default_roster_lookup() {
    let bus = MessageBus::default();
    let registry = AgentRegistry::new();
    registry.register_agents(spawn_default_agents(&bus).unwrap()).unwrap();

    assert_eq!(registry.len(), 5);
    let lookup = |capability: &str| -> Vec<String> {
        registry
            .find_agents_by_capability(capability)
            .into_iter()
            .map(|a| a.id)
            .collect()
    };

    assert_eq!(lookup("architecture"), vec!["architect"]);
    assert_eq!(lookup("ui_design"), vec!["ui-designer"]);
    assert_eq!(lookup("database"), vec!["backend-dev"]);
    assert_eq!(lookup("testing"), vec!["qa-tester"]);

    registry.set_agent_enabled("qa-tester", false);
    assert!(lookup("testing").is_empty());
    assert!(registry.get_agent("qa-tester").is_some());
}

#[tokio::test]
async fn test_registry_moves_agent_between_channels() {
    let bus = MessageBus::default();
    let registry = AgentRegistry::new();
    let generator = Arc::new(CountingGenerator::new());
    registry
        .register_agent(Agent::new(AgentConfig::new("fe", "Frontend"), bus.clone(), generator.clone()).unwrap())
        .unwrap();

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    registry.on(RegistryEventKind::StateChanged, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry
        .update_agent_config("fe", AgentConfigUpdate::team_channel("frontend"))
        .unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    bus.publish(MessageDraft::user_input("general", "ignored")).unwrap();
    bus.publish(MessageDraft::user_input("frontend", "seen")).unwrap();

    wait_for(|| results_on(&bus, "frontend").len() == 1).await;
    assert!(results_on(&bus, "general").is_empty());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_duplicate_in_batch_registration_stops_there() {
    let bus = MessageBus::default();
    let registry = AgentRegistry::new();
    let generator = Arc::new(CountingGenerator::new());
    let make = |id: &str| Agent::new(AgentConfig::new(id, id), bus.clone(), generator.clone()).unwrap();

    let err = registry
        .register_agents([make("a"), make("b"), make("a"), make("c")])
        .unwrap_err();

    assert!(matches!(err, ConclaveError::DuplicateAgent(_)));
    assert_eq!(registry.len(), 2);
    assert!(registry.get_agent("c").is_none());
}
