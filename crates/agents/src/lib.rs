//! Agents and the agent registry.
//!
//! Every agent is one concrete [`Agent`] type parameterized by:
//!
//! - an [`AgentConfig`](conclave_common::AgentConfig) carrying its id,
//!   team channel and capability tags
//! - a [`ProcessingPolicy`] deciding when buffered input is processed
//! - a [`ResponseGenerator`](conclave_common::ResponseGenerator) producing
//!   its output
//!
//! ```text
//!            team channel (MessageBus)
//!   ───────────────┬──────────────┬──────────────
//!                  │ deliver      ▲ result
//!                  ▼              │
//!            ┌───────────┐   ┌──────────┐
//!            │  buffer   │──▶│ generate │
//!            └───────────┘   └──────────┘
//! ```
//!
//! The [`AgentRegistry`] tracks agents by id and answers capability queries
//! for step assignment.

pub mod agent;
pub mod registry;
pub mod responders;
pub mod roles;

pub use agent::{Agent, ProcessingPolicy};
pub use registry::{AgentRegistry, ListenerId, RegisteredAgent, RegistryEvent, RegistryEventKind};
pub use responders::{FnResponder, TemplateResponder};
pub use roles::{default_roster, spawn_default_agents};
