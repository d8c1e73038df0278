//! Redelivery policy.
//!
//! # Responsibilities
//! - Decide what happens to a message after a requeueing nack
//! - Bound the number of redeliveries
//! - Optionally delay the requeue with exponential backoff
//!
//! # Design Decisions
//! - `max_redeliveries = 0` means unbounded
//! - Nack without requeue always discards; the policy is only consulted for
//!   requeues
//! - Backoff is off unless `base_delay_ms > 0`

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DeliveryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Where a requeued message re-enters the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequeuePosition {
    /// Redelivered next.
    #[default]
    Head,
    /// Redelivered after everything already waiting.
    Tail,
}

/// Decision for a message that a consumer asked to requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    Requeue {
        position: RequeuePosition,
        delay: Duration,
    },
    Discard,
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Requeued { delay: Duration },
    Discarded,
}

impl Settlement {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Settlement::Acked => "ack",
            Settlement::Requeued { .. } => "requeue",
            Settlement::Discarded => "discard",
        }
    }
}

/// Hook deciding the fate of requeued messages.
pub trait RedeliveryPolicy: Send + Sync + fmt::Debug {
    /// `attempts` is how many times the message has been delivered so far.
    fn decide(&self, attempts: u32) -> Redelivery;
}

/// Requeue until `max_redeliveries` is exhausted.
#[derive(Debug, Clone, Default)]
pub struct BoundedRedelivery {
    max_redeliveries: u32,
    position: RequeuePosition,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl BoundedRedelivery {
    pub fn new(max_redeliveries: u32, position: RequeuePosition) -> Self {
        Self {
            max_redeliveries,
            position,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn with_backoff(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.max_redeliveries, config.requeue_position)
            .with_backoff(config.base_delay_ms, config.max_delay_ms)
    }
}

impl RedeliveryPolicy for BoundedRedelivery {
    fn decide(&self, attempts: u32) -> Redelivery {
        let redeliveries = attempts.saturating_sub(1);
        if self.max_redeliveries > 0 && redeliveries >= self.max_redeliveries {
            return Redelivery::Discard;
        }

        let delay = if self.base_delay_ms == 0 {
            Duration::ZERO
        } else {
            calculate_backoff(attempts, self.base_delay_ms, self.max_delay_ms)
        };

        Redelivery::Requeue {
            position: self.position,
            delay,
        }
    }
}
