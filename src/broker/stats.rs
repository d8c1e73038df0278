//! Broker-wide counters.

use serde::Serialize;

use crate::queue::QueueStats;
use crate::routing::ExchangeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeStats {
    pub name: String,
    pub kind: ExchangeKind,
    pub bindings: usize,
}

/// Snapshot of every exchange and queue, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub exchanges: Vec<ExchangeStats>,
    pub queues: Vec<QueueStats>,
}
