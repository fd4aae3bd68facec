//! Common types and traits shared across conclave crates.
//!
//! This crate provides the vocabulary every component speaks: the messages
//! carried by the bus, the task plans produced by the coordinator, and the
//! agent configuration and response-generation seam.

pub mod error;
pub mod message;
pub mod task;
pub mod traits;

pub use error::{ConclaveError, Result};
pub use message::{Message, MessageDraft, MessageType};
pub use task::{PendingTask, StepOutcome, StepStatus, TaskPlan, TaskProgress, TaskStep};
pub use traits::{AgentConfig, AgentConfigUpdate, ResponseGenerator, DEFAULT_CHANNEL};
