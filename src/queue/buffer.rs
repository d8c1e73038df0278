//! A single named queue.
//!
//! # Responsibilities
//! - FIFO buffer of ready messages
//! - Unacked deliveries awaiting ack/nack
//! - Consumer registrations and idle tracking
//! - Wake the delivery loop when work may be available
//!
//! # Design Decisions
//! - One mutex guards ready, unacked and consumers; it is the serialization
//!   point that fixes FIFO order
//! - Unbounded: enqueue never drops and never blocks
//! - A requeue is a new enqueue event and gets a fresh delivery tag
//! - Closing stops enqueues and dispatch; requeues of in-flight deliveries are
//!   still accepted so they are drained with everything else
//! - A delayed requeue stays owned by the queue while its timer runs, so
//!   teardown can restore or count it

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};

use crate::broker::BrokerError;
use crate::delivery::policy::{Redelivery, RedeliveryPolicy, RequeuePosition, Settlement};
use crate::observability::metrics;
use crate::queue::consumer::{Consumer, ConsumerSet, ConsumerTag};
use crate::queue::message::{Delivery, DeliveryTag, Envelope, Message};

/// Point-in-time counters for one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    /// Ready messages waiting for a consumer.
    pub depth: usize,
    /// Delivered, not yet acked or nacked.
    pub unacked: usize,
    pub consumers: usize,
}

/// Work handed from the queue to its delivery loop.
pub(crate) struct Dispatch {
    pub consumer_tag: ConsumerTag,
    pub consumer: Arc<dyn Consumer>,
    pub delivery: Delivery,
}

/// A requeued message waiting out its backoff.
#[derive(Debug)]
struct Delayed {
    envelope: Envelope,
    position: RequeuePosition,
    timer: AbortHandle,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    unacked: HashMap<DeliveryTag, Envelope>,
    delayed: HashMap<DeliveryTag, Delayed>,
    consumers: ConsumerSet,
    next_tag: u64,
    closed: bool,
}

impl QueueState {
    fn next_tag(&mut self) -> DeliveryTag {
        self.next_tag += 1;
        DeliveryTag(self.next_tag)
    }

    fn push_ready(&mut self, envelope: Envelope, position: RequeuePosition) {
        match position {
            RequeuePosition::Head => self.ready.push_front(envelope),
            RequeuePosition::Tail => self.ready.push_back(envelope),
        }
    }
}

/// A named FIFO queue with competing consumers.
#[derive(Debug)]
pub struct Queue {
    name: String,
    state: Mutex<QueueState>,
    wakeup: Notify,
    policy: Arc<dyn RedeliveryPolicy>,
    delivery_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Queue {
    pub fn new(name: impl Into<String>, policy: Arc<dyn RedeliveryPolicy>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            policy,
            delivery_loop: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message to the tail.
    pub fn enqueue(&self, message: Message) -> Result<DeliveryTag, BrokerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BrokerError::QueueClosed(self.name.clone()));
        }

        let tag = state.next_tag();
        state.ready.push_back(Envelope {
            tag,
            delivery_count: 0,
            message,
        });
        let depth = state.ready.len();
        drop(state);

        tracing::trace!(queue = %self.name, delivery_tag = %tag, depth, "Message enqueued");
        metrics::record_enqueued(&self.name, depth);
        self.wakeup.notify_one();
        Ok(tag)
    }

    /// Pull the head message for manual ack/nack.
    pub fn fetch(&self) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BrokerError::QueueClosed(self.name.clone()));
        }
        let delivery = Self::take_head(&self.name, &mut state);
        let depth = state.ready.len();
        drop(state);

        metrics::set_queue_depth(&self.name, depth);
        Ok(delivery)
    }

    /// Pair the head message with the least-recently-used idle consumer.
    pub(crate) fn next_dispatch(&self) -> Option<Dispatch> {
        let mut state = self.lock();
        if state.closed || state.ready.is_empty() {
            return None;
        }
        let (consumer_tag, consumer) = state.consumers.acquire_idle()?;
        let delivery = Self::take_head(&self.name, &mut state)?;
        let depth = state.ready.len();
        drop(state);

        metrics::set_queue_depth(&self.name, depth);
        Some(Dispatch {
            consumer_tag,
            consumer,
            delivery,
        })
    }

    fn take_head(name: &str, state: &mut QueueState) -> Option<Delivery> {
        let mut envelope = state.ready.pop_front()?;
        envelope.delivery_count += 1;
        let delivery = envelope.to_delivery(name);
        state.unacked.insert(envelope.tag, envelope);
        Some(delivery)
    }

    /// Acknowledge a delivery, removing the message for good.
    pub fn ack(&self, tag: DeliveryTag) -> Result<Settlement, BrokerError> {
        let mut state = self.lock();
        state
            .unacked
            .remove(&tag)
            .ok_or_else(|| self.unknown_tag(tag))?;
        Ok(Settlement::Acked)
    }

    /// Reject a delivery. With `requeue` the redelivery policy decides
    /// between requeue (possibly delayed) and discard.
    pub fn nack(self: &Arc<Self>, tag: DeliveryTag, requeue: bool) -> Result<Settlement, BrokerError> {
        let mut state = self.lock();
        let envelope = state
            .unacked
            .remove(&tag)
            .ok_or_else(|| self.unknown_tag(tag))?;

        if !requeue {
            tracing::debug!(queue = %self.name, delivery_tag = %tag, "Message rejected and discarded");
            return Ok(Settlement::Discarded);
        }

        match self.policy.decide(envelope.delivery_count) {
            Redelivery::Discard => {
                tracing::warn!(
                    queue = %self.name,
                    message_id = %envelope.message.message_id,
                    attempts = envelope.delivery_count,
                    "Redelivery limit reached, discarding message"
                );
                Ok(Settlement::Discarded)
            }
            Redelivery::Requeue { position, delay } => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    // No runtime to wait on: requeue immediately.
                    self.requeue_now(state, envelope, position);
                    return Ok(Settlement::Requeued { delay });
                };
                if delay.is_zero() {
                    self.requeue_now(state, envelope, position);
                } else {
                    self.schedule_requeue(&mut state, &runtime, envelope, position, delay);
                }
                Ok(Settlement::Requeued { delay })
            }
        }
    }

    fn requeue_now(&self, mut state: MutexGuard<'_, QueueState>, mut envelope: Envelope, position: RequeuePosition) {
        envelope.tag = state.next_tag();
        state.push_ready(envelope, position);
        let depth = state.ready.len();
        drop(state);

        metrics::set_queue_depth(&self.name, depth);
        self.wakeup.notify_one();
    }

    /// Park the envelope under a fresh tag and start its timer. Runs under the
    /// state lock, so the timer cannot look the entry up before it exists.
    fn schedule_requeue(
        self: &Arc<Self>,
        state: &mut QueueState,
        runtime: &tokio::runtime::Handle,
        mut envelope: Envelope,
        position: RequeuePosition,
        delay: Duration,
    ) {
        let tag = state.next_tag();
        envelope.tag = tag;

        let queue = Arc::clone(self);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            queue.release_delayed(tag);
        });
        state.delayed.insert(
            tag,
            Delayed {
                envelope,
                position,
                timer: timer.abort_handle(),
            },
        );
        tracing::debug!(queue = %self.name, delivery_tag = %tag, delay_ms = delay.as_millis() as u64, "Requeue delayed");
    }

    /// Move a delayed envelope into `ready`. A missing entry was already
    /// restored or drained.
    fn release_delayed(&self, tag: DeliveryTag) {
        let mut state = self.lock();
        let Some(delayed) = state.delayed.remove(&tag) else {
            return;
        };
        state.push_ready(delayed.envelope, delayed.position);
        let depth = state.ready.len();
        drop(state);

        metrics::set_queue_depth(&self.name, depth);
        self.wakeup.notify_one();
    }

    /// Cancel every pending backoff timer and put those messages back into
    /// `ready`. Returns how many were restored.
    pub(crate) fn restore_delayed(&self) -> usize {
        let mut state = self.lock();
        let mut pending: Vec<Delayed> = state.delayed.drain().map(|(_, delayed)| delayed).collect();
        pending.sort_by_key(|delayed| delayed.envelope.tag);
        let restored = pending.len();
        for delayed in pending {
            delayed.timer.abort();
            state.push_ready(delayed.envelope, delayed.position);
        }
        let depth = state.ready.len();
        drop(state);

        if restored > 0 {
            tracing::debug!(queue = %self.name, restored, "Delayed requeues restored");
            metrics::set_queue_depth(&self.name, depth);
        }
        restored
    }

    fn unknown_tag(&self, tag: DeliveryTag) -> BrokerError {
        BrokerError::UnknownDeliveryTag {
            queue: self.name.clone(),
            tag,
        }
    }

    pub fn register_consumer(&self, consumer: Arc<dyn Consumer>) -> Result<ConsumerTag, BrokerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BrokerError::QueueClosed(self.name.clone()));
        }
        let tag = state.consumers.register(consumer);
        let consumers = state.consumers.len();
        drop(state);

        tracing::info!(queue = %self.name, consumer = %tag, consumers, "Consumer registered");
        metrics::set_consumer_count(&self.name, consumers);
        self.wakeup.notify_one();
        Ok(tag)
    }

    pub fn cancel_consumer(&self, tag: &ConsumerTag) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if !state.consumers.cancel(tag) {
            return Err(BrokerError::UnknownConsumer {
                queue: self.name.clone(),
                tag: tag.clone(),
            });
        }
        let consumers = state.consumers.len();
        drop(state);

        tracing::info!(queue = %self.name, consumer = %tag, consumers, "Consumer cancelled");
        metrics::set_consumer_count(&self.name, consumers);
        Ok(())
    }

    /// Mark a consumer idle after its delivery settled.
    pub(crate) fn release_consumer(&self, tag: &ConsumerTag) {
        let mut state = self.lock();
        state.consumers.release(tag);
        let idle = state.consumers.has_idle();
        let pending = !state.ready.is_empty();
        drop(state);

        if idle && pending {
            self.wakeup.notify_one();
        }
    }

    /// Drop every ready message, returning how many were discarded.
    pub fn purge(&self) -> usize {
        let mut state = self.lock();
        let purged = state.ready.len();
        state.ready.clear();
        drop(state);

        metrics::set_queue_depth(&self.name, 0);
        purged
    }

    /// Stop accepting enqueues and consumers; wakes the delivery loop so it
    /// can wind down.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wakeup.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Discard all remaining messages and release consumers. Call after the
    /// delivery loop finished. Returns the number of messages dropped.
    pub(crate) fn drain(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.ready.len() + state.unacked.len() + state.delayed.len();
        for (_, delayed) in state.delayed.drain() {
            delayed.timer.abort();
        }
        state.ready.clear();
        state.unacked.clear();
        state.consumers.clear();
        drop(state);

        metrics::set_queue_depth(&self.name, 0);
        metrics::set_consumer_count(&self.name, 0);
        dropped
    }

    pub(crate) fn wakeup(&self) -> &Notify {
        &self.wakeup
    }

    /// Start the delivery loop once; later calls are no-ops.
    pub(crate) fn ensure_delivery_loop(&self, start: impl FnOnce() -> JoinHandle<()>) {
        let mut slot = self.delivery_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(start());
        }
    }

    pub(crate) fn take_delivery_loop(&self) -> Option<JoinHandle<()>> {
        self.delivery_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            name: self.name.clone(),
            depth: state.ready.len(),
            unacked: state.unacked.len(),
            consumers: state.consumers.len(),
        }
    }

    pub fn depth(&self) -> usize {
        self.lock().ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::policy::BoundedRedelivery;
    use std::collections::BTreeMap;
    use std::time::SystemTime;
    use uuid::Uuid;

    fn queue_with(policy: BoundedRedelivery) -> Arc<Queue> {
        Arc::new(Queue::new("q", Arc::new(policy)))
    }

    fn message(body: &str) -> Message {
        Message {
            message_id: Uuid::new_v4(),
            exchange: "ex".into(),
            routing_key: "rk".into(),
            payload: body.as_bytes().to_vec(),
            headers: BTreeMap::new(),
            published_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_fifo_fetch_and_ack() {
        let queue = queue_with(BoundedRedelivery::default());
        for body in ["m1", "m2", "m3"] {
            queue.enqueue(message(body)).unwrap();
        }

        let first = queue.fetch().unwrap().unwrap();
        assert_eq!(first.payload_str(), Some("m1"));
        assert!(!first.redelivered);
        assert_eq!(first.delivery_count, 1);

        assert_eq!(queue.ack(first.delivery_tag).unwrap(), Settlement::Acked);
        assert_eq!(queue.fetch().unwrap().unwrap().payload_str(), Some("m2"));
        assert_eq!(
            queue.stats(),
            QueueStats {
                name: "q".into(),
                depth: 1,
                unacked: 1,
                consumers: 0,
            }
        );
    }

    #[test]
    fn test_ack_unknown_tag() {
        let queue = queue_with(BoundedRedelivery::default());
        let tag = queue.enqueue(message("m1")).unwrap();
        // Enqueued but never delivered.
        assert!(matches!(queue.ack(tag), Err(BrokerError::UnknownDeliveryTag { .. })));
        assert!(matches!(
            queue.nack(DeliveryTag(99), true),
            Err(BrokerError::UnknownDeliveryTag { .. })
        ));
    }

    #[test]
    fn test_nack_requeue_at_head() {
        let queue = queue_with(BoundedRedelivery::default());
        queue.enqueue(message("m1")).unwrap();
        queue.enqueue(message("m2")).unwrap();

        let first = queue.fetch().unwrap().unwrap();
        assert!(matches!(queue.nack(first.delivery_tag, true).unwrap(), Settlement::Requeued { .. }));

        let again = queue.fetch().unwrap().unwrap();
        assert_eq!(again.payload_str(), Some("m1"));
        assert!(again.redelivered);
        assert_eq!(again.delivery_count, 2);
        assert_ne!(again.delivery_tag, first.delivery_tag);
        assert_eq!(again.message.message_id, first.message.message_id);

        // The stale tag is gone.
        assert!(queue.ack(first.delivery_tag).is_err());
    }

    #[test]
    fn test_nack_requeue_at_tail() {
        let queue = queue_with(BoundedRedelivery::new(0, RequeuePosition::Tail));
        queue.enqueue(message("m1")).unwrap();
        queue.enqueue(message("m2")).unwrap();

        let first = queue.fetch().unwrap().unwrap();
        queue.nack(first.delivery_tag, true).unwrap();

        assert_eq!(queue.fetch().unwrap().unwrap().payload_str(), Some("m2"));
        assert_eq!(queue.fetch().unwrap().unwrap().payload_str(), Some("m1"));
    }

    #[test]
    fn test_nack_without_requeue_discards() {
        let queue = queue_with(BoundedRedelivery::default());
        queue.enqueue(message("m1")).unwrap();
        let delivery = queue.fetch().unwrap().unwrap();

        assert_eq!(queue.nack(delivery.delivery_tag, false).unwrap(), Settlement::Discarded);
        assert!(queue.fetch().unwrap().is_none());
        assert_eq!(queue.stats().unacked, 0);
    }

    #[test]
    fn test_redelivery_limit() {
        let queue = queue_with(BoundedRedelivery::new(1, RequeuePosition::Head));
        queue.enqueue(message("m1")).unwrap();

        let first = queue.fetch().unwrap().unwrap();
        assert!(matches!(queue.nack(first.delivery_tag, true).unwrap(), Settlement::Requeued { .. }));

        let second = queue.fetch().unwrap().unwrap();
        assert_eq!(queue.nack(second.delivery_tag, true).unwrap(), Settlement::Discarded);
        assert!(queue.fetch().unwrap().is_none());
    }

    #[test]
    fn test_closed_queue_rejects_work() {
        let queue = queue_with(BoundedRedelivery::default());
        queue.enqueue(message("m1")).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(
            queue.enqueue(message("m2")).unwrap_err(),
            BrokerError::QueueClosed("q".into())
        );
        assert!(queue.fetch().is_err());
        assert_eq!(queue.drain(), 1);
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn test_requeue_updates_depth_gauge() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            let queue = queue_with(BoundedRedelivery::default());
            queue.enqueue(message("m1")).unwrap();
            let delivery = queue.fetch().unwrap().unwrap();
            queue.nack(delivery.delivery_tag, true).unwrap();
        });

        let rendered = handle.render();
        let depth = rendered
            .lines()
            .find_map(|line| line.strip_prefix("broker_queue_depth{queue=\"q\"} "))
            .and_then(|value| value.trim().parse::<f64>().ok());
        assert_eq!(depth, Some(1.0));
    }

    #[tokio::test]
    async fn test_delayed_requeue_is_owned_by_queue() {
        let queue = queue_with(BoundedRedelivery::new(0, RequeuePosition::Tail).with_backoff(60_000, 60_000));
        queue.enqueue(message("m1")).unwrap();
        queue.enqueue(message("m2")).unwrap();

        let first = queue.fetch().unwrap().unwrap();
        queue.nack(first.delivery_tag, true).unwrap();
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.stats().unacked, 0);

        assert_eq!(queue.restore_delayed(), 1);
        assert_eq!(queue.restore_delayed(), 0);
        assert_eq!(queue.fetch().unwrap().unwrap().payload_str(), Some("m2"));
        let again = queue.fetch().unwrap().unwrap();
        assert_eq!(again.payload_str(), Some("m1"));
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn test_drain_counts_delayed_requeues() {
        let queue = queue_with(BoundedRedelivery::default().with_backoff(60_000, 60_000));
        queue.enqueue(message("m1")).unwrap();
        queue.enqueue(message("m2")).unwrap();

        let first = queue.fetch().unwrap().unwrap();
        queue.nack(first.delivery_tag, true).unwrap();
        queue.close();

        assert_eq!(queue.drain(), 2);
        assert_eq!(queue.restore_delayed(), 0);
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn test_purge() {
        let queue = queue_with(BoundedRedelivery::default());
        queue.enqueue(message("m1")).unwrap();
        queue.enqueue(message("m2")).unwrap();
        assert_eq!(queue.purge(), 2);
        assert_eq!(queue.depth(), 0);
    }
}
