//! In-process message bus for conclave agents.
//!
//! Messages are published on named channels, retained in a bounded
//! per-channel history and delivered synchronously, in subscription order,
//! to every subscriber of that channel.
//!
//! ```text
//!  publish(draft) ──► complete id/timestamp ──► history ring (cap 1000)
//!                                            └─► subscriber 1, 2, ... n
//! ```

pub mod bus;

pub use bus::{BusConfig, MessageBus, SubscriberFn, Subscription};
