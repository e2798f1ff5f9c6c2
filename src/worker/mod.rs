//! The background context: a single-threaded, event-driven scope that owns
//! the cache lifecycle and the worker-side half of notification delivery.
//!
//! In-memory state here (armed timers, anything queued toward the worker) is
//! not durable: the platform may tear the context down between events, and a
//! command issued just before that is lost.

mod context;
mod message;
mod pages;

pub use context::{BackgroundContext, LifecycleState};
pub use message::{Broadcast, Command};
pub use pages::{ChannelSlot, PageRegistry};
