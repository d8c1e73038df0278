//! Shared utilities for broker integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use exchange_router::{Broker, Consumer, ConsumerError, Delivery, ExchangeKind, Outcome};

/// Deliveries seen by a recording consumer, in arrival order.
pub type Log = Arc<Mutex<Vec<Delivery>>>;

/// Consumer that records every delivery and answers with `outcome`.
pub fn recorder(outcome: Outcome) -> (impl Consumer, Log) {
    let log: Log = Arc::default();
    let sink = log.clone();
    let consumer = move |delivery: Delivery| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(delivery);
            Ok::<_, ConsumerError>(outcome)
        }
    };
    (consumer, log)
}

/// Consumer that records the delivery, then waits for a permit before acking.
pub fn gated(gate: Arc<Semaphore>) -> (impl Consumer, Log) {
    let log: Log = Arc::default();
    let sink = log.clone();
    let consumer = move |delivery: Delivery| {
        let sink = sink.clone();
        let gate = gate.clone();
        async move {
            sink.lock().unwrap().push(delivery);
            let _permit = gate.acquire().await;
            Ok::<_, ConsumerError>(Outcome::Ack)
        }
    };
    (consumer, log)
}

pub fn payloads(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|d| d.payload_str().unwrap_or_default().to_string())
        .collect()
}

pub fn count(log: &Log) -> usize {
    log.lock().unwrap().len()
}

/// Poll `condition` for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// `exchange` of `kind` with each (queue, pattern) declared and bound.
pub fn topology(broker: &Broker, exchange: &str, kind: ExchangeKind, bindings: &[(&str, &str)]) {
    broker.declare_exchange(exchange, kind).unwrap();
    for (queue, pattern) in bindings {
        broker.declare_queue(queue).unwrap();
        broker.bind(exchange, queue, pattern).unwrap();
    }
}
