//! Message types for inter-agent communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category of a message. Interpretation of `content` depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    StatusUpdate,
    InformationRequest,
    InformationResponse,
    Notification,
    Result,
    Command,
    UiUpdate,
    UserInput,
    AgentResponse,
    SystemAlert,
    TaskUpdate,
}

impl MessageType {
    /// Categories an agent buffers as conversational input.
    ///
    /// Everything else is either handled structurally (assignments,
    /// information requests) or is another agent's output.
    pub fn is_agent_input(&self) -> bool {
        matches!(self, MessageType::UserInput | MessageType::Command)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskAssignment => "task_assignment",
            MessageType::StatusUpdate => "status_update",
            MessageType::InformationRequest => "information_request",
            MessageType::InformationResponse => "information_response",
            MessageType::Notification => "notification",
            MessageType::Result => "result",
            MessageType::Command => "command",
            MessageType::UiUpdate => "ui_update",
            MessageType::UserInput => "user_input",
            MessageType::AgentResponse => "agent_response",
            MessageType::SystemAlert => "system_alert",
            MessageType::TaskUpdate => "task_update",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published message. Never mutated after the bus hands it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: String,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Originating agent, or a system pseudo-identifier
    pub sender_id: String,

    /// Target agent; `None` broadcasts to every channel subscriber
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    pub channel_id: String,

    pub content: Value,

    pub timestamp: DateTime<Utc>,

    /// Links a response to the message it answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Metadata only; delivery is FIFO per channel regardless of priority
    pub priority: i32,
}

impl Message {
    /// Content as text when it is a JSON string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }

    /// Content rendered for humans: strings verbatim, structures as JSON.
    pub fn content_string(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this message should be seen by `agent_id`.
    pub fn is_addressed_to(&self, agent_id: &str) -> bool {
        match &self.recipient_id {
            Some(recipient) => recipient == agent_id,
            None => true,
        }
    }
}

/// A message before publication.
///
/// `id`, `timestamp` and `priority` are optional here and filled in by the
/// bus when the draft is published.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub id: Option<String>,
    pub message_type: MessageType,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub channel_id: String,
    pub content: Value,
    pub timestamp: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    pub priority: Option<i32>,
}

impl MessageDraft {
    pub fn new(
        message_type: MessageType,
        sender_id: impl Into<String>,
        channel_id: impl Into<String>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            id: None,
            message_type,
            sender_id: sender_id.into(),
            recipient_id: None,
            channel_id: channel_id.into(),
            content: content.into(),
            timestamp: None,
            correlation_id: None,
            priority: None,
        }
    }

    pub fn user_input(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageType::UserInput, "user", channel_id, text.into())
    }

    pub fn to(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    pub fn correlated_with(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fill in any missing `id`, `timestamp` and `priority`.
    pub fn complete(self) -> Message {
        Message {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_message_id),
            message_type: self.message_type,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            channel_id: self.channel_id,
            content: self.content,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            correlation_id: self.correlation_id,
            priority: self.priority.unwrap_or(0),
        }
    }
}

fn new_message_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4())
}
