//! Error types for conclave.

use crate::task::StepStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConclaveError {
    #[error("Agent id '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Invalid transition for step {step_id}: {from} -> {to}")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Channel '{channel}' already has {limit} subscribers")]
    SubscriberLimit { channel: String, limit: usize },

    #[error("Response generation failed: {0}")]
    Generation(String),

    #[error("No agent found for step \"{0}\"")]
    NoAgentForStep(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConclaveError>;
