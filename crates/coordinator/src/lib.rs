//! Team-leader coordination for conclave.
//!
//! The coordinator:
//! 1. Turns an objective into an ordered task plan
//! 2. Routes each step to a capable agent in the registry
//! 3. Assigns it over the message bus and waits for the correlated result
//! 4. Tracks step status and aggregate progress
//!
//! # Architecture
//!
//! ```text
//!   objective
//!       │
//!       ▼
//! ┌─────────────────┐   plan    ┌──────────────┐
//! │   Coordinator   │ ◀──────── │ TaskPlanner  │
//! │  (team leader)  │           └──────────────┘
//! └────────┬────────┘   route   ┌──────────────┐
//!          │ ─────────────────▶ │ StepRouter   │──▶ AgentRegistry
//!          │                    └──────────────┘
//!          ▼ task_assignment / result
//! ═══════════════════ MessageBus ═══════════════════
//!    ▲            ▲             ▲             ▲
//! [architect] [ui-designer] [frontend-dev] [qa-tester] ...
//! ```

pub mod config;
pub mod coordinator;
pub mod planner;
pub mod routing;
pub mod session;

pub use config::{CompletionPolicy, CoordinatorConfig};
pub use coordinator::Coordinator;
pub use planner::{KeywordPlanner, TaskPlanner};
pub use routing::{RouteDecision, RouteSource, StepRouter};
pub use session::AgentSession;
