//! Queue subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher decision
//!     → table.rs (name → queue)
//!     → buffer.rs enqueue (tail of the ready FIFO)
//!     → delivery loop: next_dispatch pairs head message with an idle consumer
//!       (consumer.rs, least-recently-used)
//!     → ack / nack settles the unacked entry
//! ```
//!
//! # Design Decisions
//! - A queue exists independently of exchanges; bindings only point at it
//! - Each queue owns its message copies; nothing is shared across queues
//! - Zero consumers is valid: messages accumulate until fetched or consumed

pub mod buffer;
pub mod consumer;
pub mod message;
pub mod table;

pub use buffer::{Queue, QueueStats};
pub use consumer::{ConsumeResult, Consumer, ConsumerError, ConsumerSet, ConsumerTag, Outcome};
pub use message::{Delivery, DeliveryTag, Message};
pub use table::QueueTable;
