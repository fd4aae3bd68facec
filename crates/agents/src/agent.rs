//! The concrete agent type.
//!
//! Every agent is the same struct: a config, a processing policy and a
//! pluggable [`ResponseGenerator`]. Specializations differ only in those
//! three values.
//!
//! Inbound flow:
//!
//! 1. The bus delivers a message on the agent's team channel.
//! 2. Own messages, messages for another recipient and other agents'
//!    outputs are ignored.
//! 3. Task assignments become work items, information requests go to the
//!    generator's hook, text input is buffered.
//! 4. If the policy says so, the buffer is drained on a spawned task, handed
//!    to the generator, and the response is broadcast as a `result`.

use conclave_bus::{MessageBus, Subscription};
use conclave_common::{
    AgentConfig, AgentConfigUpdate, Message, MessageDraft, MessageType, ResponseGenerator, Result,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Decides when an agent drains its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingPolicy {
    /// Respond as soon as anything is buffered.
    #[default]
    Eager,
    /// Wait until `threshold` items are buffered.
    Batch { threshold: usize },
    /// Only [`Agent::flush`] drains the buffer.
    Manual,
}

impl ProcessingPolicy {
    pub fn should_process(&self, buffered: usize) -> bool {
        match self {
            ProcessingPolicy::Eager => buffered > 0,
            ProcessingPolicy::Batch { threshold } => buffered >= (*threshold).max(1),
            ProcessingPolicy::Manual => false,
        }
    }
}

#[derive(Debug, Clone)]
enum BufferedItem {
    Text {
        text: String,
    },
    Work {
        description: String,
        original_message_id: String,
    },
}

impl BufferedItem {
    fn render(&self) -> String {
        match self {
            BufferedItem::Text { text } => text.clone(),
            BufferedItem::Work {
                description,
                original_message_id,
            } => json!({
                "description": description,
                "originalMessageId": original_message_id,
            })
            .to_string(),
        }
    }

    fn assignment_id(&self) -> Option<&str> {
        match self {
            BufferedItem::Work {
                original_message_id,
                ..
            } => Some(original_message_id),
            BufferedItem::Text { .. } => None,
        }
    }
}

struct AgentInner {
    config: RwLock<AgentConfig>,
    bus: MessageBus,
    generator: Arc<dyn ResponseGenerator>,
    policy: ProcessingPolicy,
    buffer: Mutex<Vec<BufferedItem>>,
    subscription: Mutex<Option<Subscription>>,
    responses: AtomicU64,
}

/// A capability-tagged participant on a team channel.
///
/// Cloning yields another handle to the same agent.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Create an eager agent and subscribe it to its team channel.
    pub fn new(
        config: AgentConfig,
        bus: MessageBus,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Result<Self> {
        Self::with_policy(config, bus, generator, ProcessingPolicy::Eager)
    }

    pub fn with_policy(
        config: AgentConfig,
        bus: MessageBus,
        generator: Arc<dyn ResponseGenerator>,
        policy: ProcessingPolicy,
    ) -> Result<Self> {
        let channel = config.team_channel.clone();
        let inner = Arc::new(AgentInner {
            config: RwLock::new(config),
            bus,
            generator,
            policy,
            buffer: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            responses: AtomicU64::new(0),
        });

        let subscription = subscribe_to(&inner, &channel)?;
        *inner.subscription.lock() = Some(subscription);

        let agent = Self { inner };
        info!(
            agent = %agent.id(),
            channel = %channel,
            policy = ?policy,
            "Agent joined team channel"
        );
        Ok(agent)
    }

    pub fn id(&self) -> String {
        self.inner.config.read().id.clone()
    }

    pub fn name(&self) -> String {
        self.inner.config.read().name.clone()
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.inner.config.read().capabilities.clone()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.inner.config.read().has_capability(capability)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> AgentConfig {
        self.inner.config.read().clone()
    }

    pub fn policy(&self) -> ProcessingPolicy {
        self.inner.policy
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn buffered_len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Number of `result` messages this agent has broadcast.
    pub fn responses_published(&self) -> u64 {
        self.inner.responses.load(Ordering::Relaxed)
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.subscription.lock().is_some()
    }

    /// Apply a partial config update, moving to a new team channel if it
    /// changed.
    pub fn update_config(&self, update: AgentConfigUpdate) -> Result<()> {
        let mut next = self.config();
        let previous_channel = next.team_channel.clone();
        next.apply(update);

        if next.team_channel != previous_channel {
            let subscription = subscribe_to(&self.inner, &next.team_channel)?;
            // Replacing the handle drops the old subscription.
            *self.inner.subscription.lock() = Some(subscription);
            info!(
                agent = %next.id,
                from = %previous_channel,
                to = %next.team_channel,
                "Agent moved to a new team channel"
            );
        }

        *self.inner.config.write() = next;
        Ok(())
    }

    /// Leave the team channel and drop anything still buffered.
    pub fn dispose(&self) {
        self.inner.subscription.lock().take();
        self.inner.buffer.lock().clear();
        debug!(agent = %self.id(), "Agent disposed");
    }

    /// Bus entry point: classify and buffer one inbound message.
    fn receive(&self, message: &Message) {
        let id = self.id();
        if message.sender_id == id || !message.is_addressed_to(&id) {
            return;
        }

        match message.message_type {
            MessageType::TaskAssignment => self.accept_assignment(message),
            MessageType::InformationRequest => self.answer_information_request(message),
            kind if kind.is_agent_input() => {
                if let Some(text) = message.text() {
                    self.inner.buffer.lock().push(BufferedItem::Text {
                        text: text.to_string(),
                    });
                    self.dispatch_if_ready();
                }
            }
            kind => {
                trace!(agent = %id, message_type = %kind, "Ignoring non-input message");
            }
        }
    }

    fn accept_assignment(&self, message: &Message) {
        let Some(description) = message.content.get("description").and_then(Value::as_str) else {
            warn!(
                agent = %self.id(),
                message_id = %message.id,
                "Task assignment without a description"
            );
            return;
        };

        debug!(
            agent = %self.id(),
            message_id = %message.id,
            from = %message.sender_id,
            "Task assignment buffered"
        );

        self.inner.buffer.lock().push(BufferedItem::Work {
            description: description.to_string(),
            original_message_id: message.id.clone(),
        });
        self.dispatch_if_ready();
    }

    fn answer_information_request(&self, message: &Message) {
        let config = self.config();
        match self.inner.generator.on_information_request(&config, message) {
            Some(reply) => {
                if let Err(e) = self.send_response(&message.sender_id, reply, Some(&message.id)) {
                    warn!(agent = %config.id, error = %e, "Failed to answer information request");
                }
            }
            None => {
                info!(
                    agent = %config.id,
                    from = %message.sender_id,
                    request = %message.content_string(),
                    "Information request received"
                );
            }
        }
    }

    /// Drain the buffer onto a spawned task if the policy allows.
    fn dispatch_if_ready(&self) {
        let batch = {
            let mut buffer = self.inner.buffer.lock();
            if !self.inner.policy.should_process(buffer.len()) {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let agent = self.clone();
                handle.spawn(async move {
                    agent.process_batch(batch).await;
                });
            }
            Err(_) => {
                warn!(
                    agent = %self.id(),
                    "No async runtime available; keeping messages buffered"
                );
                let mut buffer = self.inner.buffer.lock();
                let newer = std::mem::take(&mut *buffer);
                *buffer = batch;
                buffer.extend(newer);
            }
        }
    }

    /// Buffer a message directly and process inline if the policy allows.
    ///
    /// Returns the broadcast response, if one was produced.
    pub async fn handle_message(&self, message: &Message) -> Option<Arc<Message>> {
        let batch = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push(BufferedItem::Text {
                text: message.content_string(),
            });
            if !self.inner.policy.should_process(buffer.len()) {
                return None;
            }
            std::mem::take(&mut *buffer)
        };
        self.process_batch(batch).await
    }

    /// Process whatever is buffered now, regardless of policy.
    pub async fn flush(&self) -> Option<Arc<Message>> {
        let batch = std::mem::take(&mut *self.inner.buffer.lock());
        self.process_batch(batch).await
    }

    async fn process_batch(&self, batch: Vec<BufferedItem>) -> Option<Arc<Message>> {
        if batch.is_empty() {
            return None;
        }

        let config = self.config();
        let context = batch
            .iter()
            .map(BufferedItem::render)
            .collect::<Vec<_>>()
            .join("\n");
        let correlation = batch
            .iter()
            .rev()
            .find_map(BufferedItem::assignment_id)
            .map(str::to_owned);

        debug!(
            agent = %config.id,
            items = batch.len(),
            context_len = context.len(),
            "Generating response"
        );

        // Run the generator on its own task so a panic is contained here.
        let generator = Arc::clone(&self.inner.generator);
        let task_config = config.clone();
        let generated = tokio::spawn(async move {
            generator.generate_response(&task_config, &context).await
        })
        .await;

        let content = match generated {
            Ok(Ok(text)) => Value::String(text),
            Ok(Err(e)) => {
                error!(agent = %config.id, error = %e, "Response generation failed");
                apology(&config, &e.to_string())
            }
            Err(e) => {
                error!(agent = %config.id, error = %e, "Response generation aborted");
                apology(&config, &e.to_string())
            }
        };

        let mut draft = MessageDraft::new(
            MessageType::Result,
            config.id.as_str(),
            config.team_channel.as_str(),
            content,
        );
        if let Some(correlation_id) = correlation {
            draft = draft.correlated_with(correlation_id);
        }

        match self.inner.bus.publish(draft) {
            Ok(message) => {
                self.inner.responses.fetch_add(1, Ordering::Relaxed);
                Some(message)
            }
            Err(e) => {
                error!(agent = %config.id, error = %e, "Failed to broadcast response");
                None
            }
        }
    }

    /// Log an activity and announce it on the team channel.
    pub fn log_action(&self, text: impl Into<String>) {
        let config = self.config();
        let text = text.into();
        info!(agent = %config.id, "{}", text);

        if let Err(e) = self.inner.bus.publish(MessageDraft::new(
            MessageType::Notification,
            config.id.as_str(),
            config.team_channel.as_str(),
            text,
        )) {
            warn!(agent = %config.id, error = %e, "Failed to publish activity notification");
        }
    }

    /// Ask another agent for information.
    pub fn send_request(&self, recipient_id: &str, content: impl Into<Value>) -> Result<Arc<Message>> {
        let config = self.config();
        self.inner.bus.publish(
            MessageDraft::new(
                MessageType::InformationRequest,
                config.id.as_str(),
                config.team_channel.as_str(),
                content,
            )
            .to(recipient_id),
        )
    }

    /// Reply to a specific agent, optionally correlated with its request.
    pub fn send_response(
        &self,
        recipient_id: &str,
        content: impl Into<Value>,
        correlation_id: Option<&str>,
    ) -> Result<Arc<Message>> {
        let config = self.config();
        let mut draft = MessageDraft::new(
            MessageType::InformationResponse,
            config.id.as_str(),
            config.team_channel.as_str(),
            content,
        )
        .to(recipient_id);
        if let Some(correlation_id) = correlation_id {
            draft = draft.correlated_with(correlation_id);
        }
        self.inner.bus.publish(draft)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &*self.inner.config.read())
            .field("policy", &self.inner.policy)
            .field("buffered", &self.buffered_len())
            .finish()
    }
}

fn subscribe_to(inner: &Arc<AgentInner>, channel: &str) -> Result<Subscription> {
    let weak = Arc::downgrade(inner);
    inner.bus.subscribe(channel, move |message: &Message| {
        if let Some(inner) = weak.upgrade() {
            Agent { inner }.receive(message);
        }
        Ok(())
    })
}

fn apology(config: &AgentConfig, reason: &str) -> Value {
    json!({
        "error": reason,
        "text": format!(
            "Sorry, {} could not complete this request: {}",
            config.name, reason
        ),
    })
}
