//! Delivery subsystem.
//!
//! # Data Flow
//! ```text
//! Queue wakeup (enqueue, consumer idle, requeue)
//!     → worker.rs: pair ready messages with idle consumers
//!     → consumer task: Delivery → Outcome
//!         Ack                 → removed
//!         Nack(requeue=false) → discarded
//!         Nack(requeue=true)  → policy.rs → requeue (head/tail, delay) or discard
//!         Err / panic         → treated as Nack(requeue=true)
//! ```
//!
//! # Design Decisions
//! - One loop per queue; queues never wait on each other
//! - Consumer failures stay inside the loop, publishers never see them

pub mod policy;
pub mod worker;

pub use policy::{BoundedRedelivery, Redelivery, RedeliveryPolicy, RequeuePosition, Settlement};
pub use worker::DeliveryLoop;
