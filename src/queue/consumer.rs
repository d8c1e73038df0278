//! Consumer registrations and selection.
//!
//! # Responsibilities
//! - Define the consumer invocation contract (`Delivery` → `Outcome`)
//! - Track which consumers of a queue are idle
//! - Pick the next consumer for a delivery
//!
//! # Design Decisions
//! - One delivery in flight per consumer; a busy consumer is skipped, so a
//!   blocked consumer never holds up its siblings
//! - Least-recently-used idle consumer wins, ties go to the earliest
//!   registration (stable)

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;

use crate::queue::message::Delivery;

/// Result a consumer reports for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Nack { requeue: bool },
}

/// Failure raised by consumer code. Treated as `Nack { requeue: true }`.
#[derive(Debug, Error)]
#[error("consumer failed: {0}")]
pub struct ConsumerError(String);

impl ConsumerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type ConsumeResult = Result<Outcome, ConsumerError>;

/// Callback invoked once per delivery.
pub trait Consumer: Send + Sync + 'static {
    fn consume(&self, delivery: Delivery) -> BoxFuture<'static, ConsumeResult>;
}

impl<F, Fut> Consumer for F
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ConsumeResult> + Send + 'static,
{
    fn consume(&self, delivery: Delivery) -> BoxFuture<'static, ConsumeResult> {
        (self)(delivery).boxed()
    }
}

/// Identifier of a consumer registration on a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConsumerTag(String);

impl ConsumerTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct ConsumerSlot {
    tag: ConsumerTag,
    consumer: Arc<dyn Consumer>,
    busy: bool,
    last_used: u64,
}

// Arc<dyn Consumer> has no Debug, so the slot prints its bookkeeping only.
impl fmt::Debug for ConsumerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSlot")
            .field("tag", &self.tag)
            .field("busy", &self.busy)
            .field("last_used", &self.last_used)
            .finish()
    }
}

/// The consumers registered on one queue.
#[derive(Debug, Default)]
pub struct ConsumerSet {
    slots: Vec<ConsumerSlot>,
    clock: u64,
    next_id: u64,
}

impl ConsumerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, consumer: Arc<dyn Consumer>) -> ConsumerTag {
        self.next_id += 1;
        let tag = ConsumerTag(format!("ctag-{}", self.next_id));
        self.slots.push(ConsumerSlot {
            tag: tag.clone(),
            consumer,
            busy: false,
            last_used: 0,
        });
        tag
    }

    /// Remove a registration. An in-flight delivery still completes.
    pub fn cancel(&mut self, tag: &ConsumerTag) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| &slot.tag != tag);
        self.slots.len() != before
    }

    /// Pick the least-recently-used idle consumer and mark it busy.
    pub fn acquire_idle(&mut self) -> Option<(ConsumerTag, Arc<dyn Consumer>)> {
        let slot = self
            .slots
            .iter_mut()
            .filter(|slot| !slot.busy)
            .min_by_key(|slot| slot.last_used)?;

        self.clock += 1;
        slot.busy = true;
        slot.last_used = self.clock;
        Some((slot.tag.clone(), slot.consumer.clone()))
    }

    /// Mark a consumer idle again. Cancelled consumers are ignored.
    pub fn release(&mut self, tag: &ConsumerTag) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| &slot.tag == tag) {
            slot.busy = false;
        }
    }

    pub fn has_idle(&self) -> bool {
        self.slots.iter().any(|slot| !slot.busy)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
