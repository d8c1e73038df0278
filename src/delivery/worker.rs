//! Per-queue delivery loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::delivery::policy::Settlement;
use crate::observability::metrics;
use crate::queue::buffer::{Dispatch, Queue};
use crate::queue::consumer::Outcome;

/// Drains one queue to its consumers.
///
/// Every consumer invocation runs as its own task, so a slow consumer only
/// occupies itself. The loop stops when the queue is closed or the broker
/// shuts down, and waits for in-flight invocations to settle before
/// returning.
pub struct DeliveryLoop {
    queue: Arc<Queue>,
    shutdown: broadcast::Receiver<()>,
    in_flight: JoinSet<()>,
}

impl DeliveryLoop {
    pub fn new(queue: Arc<Queue>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            queue,
            shutdown,
            in_flight: JoinSet::new(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::debug!(queue = %self.queue.name(), "Delivery loop started");

        loop {
            if self.queue.is_closed() {
                break;
            }

            while let Some(dispatch) = self.queue.next_dispatch() {
                self.launch(dispatch);
            }

            tokio::select! {
                _ = self.queue.wakeup().notified() => {}
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(queue = %self.queue.name(), error = %e, "Delivery task failed");
                    }
                }
                _ = self.shutdown.recv() => {
                    tracing::debug!(queue = %self.queue.name(), "Delivery loop received shutdown signal");
                    break;
                }
            }
        }

        let pending = self.in_flight.len();
        if pending > 0 {
            tracing::info!(queue = %self.queue.name(), pending, "Waiting for in-flight deliveries");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(queue = %self.queue.name(), error = %e, "Delivery task failed");
            }
        }

        tracing::debug!(queue = %self.queue.name(), "Delivery loop stopped");
    }

    fn launch(&mut self, dispatch: Dispatch) {
        let queue = self.queue.clone();
        self.in_flight.spawn(deliver(queue, dispatch));
    }
}

/// Invoke the consumer once and settle the delivery with its outcome.
async fn deliver(queue: Arc<Queue>, dispatch: Dispatch) {
    let Dispatch {
        consumer_tag,
        consumer,
        delivery,
    } = dispatch;
    let tag = delivery.delivery_tag;
    let attempt = delivery.delivery_count;

    tracing::debug!(
        queue = %queue.name(),
        consumer = %consumer_tag,
        delivery_tag = %tag,
        attempt,
        "Delivering message"
    );

    let invocation = AssertUnwindSafe(consumer.consume(delivery)).catch_unwind();
    let outcome = match invocation.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::warn!(queue = %queue.name(), delivery_tag = %tag, error = %e, "Consumer failed, requeueing");
            Outcome::Nack { requeue: true }
        }
        Err(_) => {
            tracing::error!(queue = %queue.name(), delivery_tag = %tag, "Consumer panicked, requeueing");
            Outcome::Nack { requeue: true }
        }
    };

    let settled = match outcome {
        Outcome::Ack => queue.ack(tag),
        Outcome::Nack { requeue } => queue.nack(tag, requeue),
    };

    match settled {
        Ok(settlement) => {
            if let Settlement::Requeued { delay } = settlement {
                tracing::debug!(queue = %queue.name(), delivery_tag = %tag, ?delay, "Message requeued");
            }
            metrics::record_settlement(queue.name(), settlement);
        }
        // The consumer already settled the tag through the broker API.
        Err(e) => tracing::debug!(queue = %queue.name(), error = %e, "Delivery already settled"),
    }

    queue.release_consumer(&consumer_tag);
}
