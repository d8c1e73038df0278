//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the broker from validated configuration
//! - Declare exchanges, then queues, then bindings
//!
//! # Design Decisions
//! - Fail fast: the first topology error aborts startup
//! - Exchanges and queues exist before any binding references them

use crate::broker::{Broker, BrokerError};
use crate::config::BrokerConfig;

/// Apply the configured topology to `broker`.
pub fn apply_topology(broker: &Broker, config: &BrokerConfig) -> Result<(), BrokerError> {
    for exchange in &config.exchanges {
        broker.declare_exchange(&exchange.name, exchange.kind)?;
    }
    for queue in &config.queues {
        broker.declare_queue(&queue.name)?;
    }
    for binding in &config.bindings {
        broker.bind(&binding.exchange, &binding.queue, &binding.pattern)?;
    }

    tracing::info!(
        exchanges = config.exchanges.len(),
        queues = config.queues.len(),
        bindings = config.bindings.len(),
        "Topology applied"
    );
    Ok(())
}

/// Create a broker with the configured redelivery policy and topology.
pub fn build_broker(config: &BrokerConfig) -> Result<Broker, BrokerError> {
    let broker = Broker::from_config(&config.delivery);
    apply_topology(&broker, config)?;
    Ok(broker)
}
