//! Metrics collection and exposition.
//!
//! # Metrics
//! - `broker_messages_published_total` (counter): publishes by exchange
//! - `broker_messages_unroutable_total` (counter): publishes matching no queue
//! - `broker_messages_enqueued_total` (counter): copies enqueued by queue
//! - `broker_deliveries_total` (counter): settlements by queue, outcome
//! - `broker_queue_depth` (gauge): ready messages per queue
//! - `broker_queue_consumers` (gauge): registered consumers per queue
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::delivery::policy::Settlement;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_published(exchange: &str, routed_to: usize) {
    counter!("broker_messages_published_total", "exchange" => exchange.to_string()).increment(1);
    if routed_to == 0 {
        counter!("broker_messages_unroutable_total", "exchange" => exchange.to_string()).increment(1);
    }
}

pub fn record_enqueued(queue: &str, depth: usize) {
    counter!("broker_messages_enqueued_total", "queue" => queue.to_string()).increment(1);
    set_queue_depth(queue, depth);
}

pub fn record_settlement(queue: &str, settlement: Settlement) {
    counter!(
        "broker_deliveries_total",
        "queue" => queue.to_string(),
        "outcome" => settlement.label()
    )
    .increment(1);
}

pub fn set_queue_depth(queue: &str, depth: usize) {
    gauge!("broker_queue_depth", "queue" => queue.to_string()).set(depth as f64);
}

pub fn set_consumer_count(queue: &str, consumers: usize) {
    gauge!("broker_queue_consumers", "queue" => queue.to_string()).set(consumers as f64);
}
