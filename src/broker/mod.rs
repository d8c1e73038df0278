//! Broker subsystem.
//!
//! # Data Flow
//! ```text
//! Producer → Broker::publish
//!     → dispatcher.rs (exchange lookup, binding snapshot, match, dedup)
//!     → Queue::enqueue (one owned copy per target queue)
//!     → DeliveryLoop (per queue) → Consumer
//!     → ack / nack → RedeliveryPolicy
//! ```
//!
//! # Design Decisions
//! - `Broker` is an explicit context object; nothing is global
//! - Publishing never waits on consumers
//! - Errors are returned synchronously to the caller of each operation

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod stats;

pub use context::Broker;
pub use dispatcher::{Dispatcher, PublishRequest};
pub use error::{BrokerError, ErrorClass};
pub use stats::{BrokerStats, ExchangeStats};
