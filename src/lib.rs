//! In-process exchange routing and dispatch engine.
//!
//! Producers publish to fanout, direct or topic exchanges; bindings route
//! each message into zero or more queues; every queue drains to its
//! consumers with ack/nack and bounded redelivery.

// Core
pub mod broker;
pub mod delivery;
pub mod queue;
pub mod routing;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use broker::{Broker, BrokerError, ErrorClass, PublishRequest};
pub use config::BrokerConfig;
pub use delivery::{BoundedRedelivery, RedeliveryPolicy, RequeuePosition};
pub use lifecycle::Shutdown;
pub use queue::{ConsumeResult, Consumer, ConsumerError, ConsumerTag, Delivery, DeliveryTag, Outcome};
pub use routing::ExchangeKind;
