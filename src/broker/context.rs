//! The broker context object.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::broker::dispatcher::{Dispatcher, PublishRequest};
use crate::broker::stats::{BrokerStats, ExchangeStats};
use crate::broker::BrokerError;
use crate::config::DeliveryConfig;
use crate::delivery::{BoundedRedelivery, DeliveryLoop, RedeliveryPolicy, Settlement};
use crate::lifecycle::Shutdown;
use crate::queue::{Consumer, ConsumerTag, Delivery, DeliveryTag, QueueStats, QueueTable};
use crate::routing::{Binding, Exchange, ExchangeKind, ExchangeRegistry};

/// Owns every exchange, queue and delivery loop.
///
/// There is no global broker; callers create one and share it (usually in an
/// `Arc`). All operations take `&self` and may be called concurrently.
pub struct Broker {
    exchanges: ExchangeRegistry,
    queues: QueueTable,
    shutdown: Shutdown,
}

impl Broker {
    pub fn new(policy: Arc<dyn RedeliveryPolicy>) -> Self {
        Self {
            exchanges: ExchangeRegistry::new(),
            queues: QueueTable::new(policy),
            shutdown: Shutdown::new(),
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(Arc::new(BoundedRedelivery::from_config(config)))
    }

    // ---- topology ----

    pub fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        self.exchanges.declare(name, kind).map(|_| ())
    }

    /// Remove an exchange and its bindings. Later publishes to it fail with
    /// `ExchangeNotFound`.
    pub fn delete_exchange(&self, name: &str) -> Result<(), BrokerError> {
        let exchange = self.exchanges.remove(name)?;
        tracing::info!(exchange = %name, bindings = exchange.bindings().len(), "Exchange deleted");
        Ok(())
    }

    pub fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.queues.declare(name).map(|_| ())
    }

    /// Tear a queue down and return the number of messages discarded.
    ///
    /// The queue disappears from the table and from every binding first, so
    /// new publishes skip it. In-flight consumer invocations are awaited and
    /// their outcome applied before the remaining messages are dropped.
    pub async fn delete_queue(&self, name: &str) -> Result<usize, BrokerError> {
        let queue = self.queues.remove(name)?;
        let unbound = self.exchanges.unbind_queue(name);
        queue.close();

        if let Some(handle) = queue.take_delivery_loop() {
            if let Err(e) = handle.await {
                tracing::error!(queue = %name, error = %e, "Delivery loop failed");
            }
        }

        let discarded = queue.drain();
        tracing::info!(queue = %name, unbound, discarded, "Queue deleted");
        Ok(discarded)
    }

    /// Bind `queue` to `exchange`. Both must already be declared.
    pub fn bind(&self, exchange: &str, queue: &str, pattern: &str) -> Result<(), BrokerError> {
        let target = self.exchanges.get(exchange)?;
        if !self.queues.contains(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }
        let inserted = target.bind(queue, pattern)?;
        self.confirm_binding(&target, queue, pattern, inserted)?;
        if inserted {
            tracing::info!(exchange = %exchange, queue = %queue, pattern = %pattern, "Queue bound");
        }
        Ok(())
    }

    /// A concurrent `delete_queue` may have removed and unbound the queue
    /// between the lookup and the insert. Roll the insert back in that case.
    fn confirm_binding(&self, target: &Exchange, queue: &str, pattern: &str, inserted: bool) -> Result<(), BrokerError> {
        match self.queues.get(queue) {
            Ok(current) if !current.is_closed() => Ok(()),
            _ => {
                if inserted {
                    target.unbind(queue, pattern);
                }
                Err(BrokerError::QueueNotFound(queue.to_string()))
            }
        }
    }

    /// Remove a binding. Unknown (queue, pattern) pairs are a no-op.
    pub fn unbind(&self, exchange: &str, queue: &str, pattern: &str) -> Result<(), BrokerError> {
        if self.exchanges.get(exchange)?.unbind(queue, pattern) {
            tracing::info!(exchange = %exchange, queue = %queue, pattern = %pattern, "Queue unbound");
        }
        Ok(())
    }

    pub fn bindings_for(&self, exchange: &str) -> Result<Arc<Vec<Binding>>, BrokerError> {
        Ok(self.exchanges.get(exchange)?.bindings().snapshot())
    }

    // ---- publish ----

    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.exchanges, &self.queues)
    }

    /// Route a message and return the queues it reached.
    pub fn publish(&self, request: PublishRequest) -> Result<BTreeSet<String>, BrokerError> {
        self.dispatcher().publish(request)
    }

    // ---- consume ----

    /// Attach a consumer to a queue, starting its delivery loop on first use.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_consumer<C: Consumer>(&self, queue: &str, consumer: C) -> Result<ConsumerTag, BrokerError> {
        let target = self.queues.get(queue)?;
        let tag = target.register_consumer(Arc::new(consumer))?;
        target.ensure_delivery_loop(|| DeliveryLoop::new(target.clone(), self.shutdown.subscribe()).spawn());
        Ok(tag)
    }

    /// Detach a consumer. A delivery it is currently handling still settles.
    pub fn cancel_consumer(&self, queue: &str, tag: &ConsumerTag) -> Result<(), BrokerError> {
        self.queues.get(queue)?.cancel_consumer(tag)
    }

    pub fn ack(&self, queue: &str, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.queues.get(queue)?.ack(tag).map(|_| ())
    }

    /// Negatively acknowledge a delivery. The returned settlement says
    /// whether the message was requeued or discarded.
    pub fn nack(&self, queue: &str, tag: DeliveryTag, requeue: bool) -> Result<Settlement, BrokerError> {
        self.queues.get(queue)?.nack(tag, requeue)
    }

    /// Take the head message without a consumer; settle it with `ack`/`nack`.
    pub fn fetch(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        self.queues.get(queue)?.fetch()
    }

    /// Drop every ready message in a queue.
    pub fn purge(&self, queue: &str) -> Result<usize, BrokerError> {
        let purged = self.queues.get(queue)?.purge();
        tracing::info!(queue = %queue, purged, "Queue purged");
        Ok(purged)
    }

    // ---- observability ----

    pub fn queue_stats(&self, queue: &str) -> Result<QueueStats, BrokerError> {
        Ok(self.queues.get(queue)?.stats())
    }

    pub fn stats(&self) -> BrokerStats {
        let exchanges = self
            .exchanges
            .all()
            .iter()
            .map(|e| ExchangeStats {
                name: e.name().to_string(),
                kind: e.kind(),
                bindings: e.bindings().len(),
            })
            .collect();
        let queues = self.queues.all().iter().map(|q| q.stats()).collect();
        BrokerStats { exchanges, queues }
    }

    /// Stop every delivery loop, waiting for in-flight consumers to settle.
    ///
    /// Queues are closed; messages still in them are left in place,
    /// including requeues that were waiting out a backoff.
    pub async fn shutdown(&self) {
        tracing::info!(delivery_loops = self.shutdown.receiver_count(), "Broker shutting down");
        self.shutdown.trigger();

        let queues = self.queues.all();
        for queue in &queues {
            queue.close();
        }
        for queue in &queues {
            if let Some(handle) = queue.take_delivery_loop() {
                if let Err(e) = handle.await {
                    tracing::error!(queue = %queue.name(), error = %e, "Delivery loop failed");
                }
            }
            queue.restore_delayed();
        }

        tracing::info!("Broker stopped");
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(Arc::new(BoundedRedelivery::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ErrorClass;

    #[test]
    fn test_bind_requires_declared_queue() {
        let broker = Broker::default();
        broker.declare_exchange("orders", ExchangeKind::Direct).unwrap();

        let err = broker.bind("orders", "missing", "order.br.ok").unwrap_err();
        assert_eq!(err, BrokerError::QueueNotFound("missing".into()));

        let err = broker.bind("nope", "missing", "x").unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn test_bind_rolls_back_when_queue_deleted_mid_bind() {
        let broker = Broker::default();
        broker.declare_exchange("logs", ExchangeKind::Fanout).unwrap();
        broker.declare_queue("q").unwrap();
        let target = broker.exchanges.get("logs").unwrap();

        // Queue removed and unbound after bind's lookup, before its insert.
        let queue = broker.queues.remove("q").unwrap();
        broker.exchanges.unbind_queue("q");
        queue.close();
        let inserted = target.bind("q", "").unwrap();

        let err = broker.confirm_binding(&target, "q", "", inserted).unwrap_err();
        assert_eq!(err, BrokerError::QueueNotFound("q".into()));
        assert!(broker.bindings_for("logs").unwrap().is_empty());

        // A redeclared queue of the same name gets no traffic.
        broker.declare_queue("q").unwrap();
        assert!(broker.publish(PublishRequest::new("logs", "", "x")).unwrap().is_empty());
    }

    #[test]
    fn test_unbind_is_noop_when_absent() {
        let broker = Broker::default();
        broker.declare_exchange("orders", ExchangeKind::Direct).unwrap();
        broker.declare_queue("q").unwrap();
        broker.unbind("orders", "q", "order.br.ok").unwrap();

        broker.bind("orders", "q", "order.br.ok").unwrap();
        assert_eq!(broker.bindings_for("orders").unwrap().len(), 1);
        broker.unbind("orders", "q", "order.br.ok").unwrap();
        assert!(broker.bindings_for("orders").unwrap().is_empty());
    }

    #[test]
    fn test_delete_exchange() {
        let broker = Broker::default();
        broker.declare_exchange("logs", ExchangeKind::Fanout).unwrap();
        broker.delete_exchange("logs").unwrap();

        let err = broker.publish(PublishRequest::new("logs", "", "x")).unwrap_err();
        assert_eq!(err, BrokerError::ExchangeNotFound("logs".into()));
        assert!(broker.delete_exchange("logs").is_err());
    }

    #[test]
    fn test_fetch_ack_and_stats() {
        let broker = Broker::default();
        broker.declare_exchange("orders", ExchangeKind::Direct).unwrap();
        broker.declare_queue("q").unwrap();
        broker.bind("orders", "q", "order.br.ok").unwrap();
        broker.publish(PublishRequest::new("orders", "order.br.ok", "1")).unwrap();
        broker.publish(PublishRequest::new("orders", "order.br.ok", "2")).unwrap();

        let delivery = broker.fetch("q").unwrap().unwrap();
        assert_eq!(delivery.payload(), b"1");

        let stats = broker.stats();
        assert_eq!(stats.exchanges[0].bindings, 1);
        assert_eq!(
            stats.queues[0],
            QueueStats {
                name: "q".into(),
                depth: 1,
                unacked: 1,
                consumers: 0,
            }
        );

        broker.ack("q", delivery.delivery_tag).unwrap();
        assert!(broker.ack("q", delivery.delivery_tag).is_err());
        assert_eq!(broker.purge("q").unwrap(), 1);
        assert_eq!(broker.queue_stats("q").unwrap().depth, 0);
    }

    #[tokio::test]
    async fn test_delete_queue_unbinds_and_discards() {
        let broker = Broker::default();
        broker.declare_exchange("logs", ExchangeKind::Fanout).unwrap();
        broker.declare_queue("q").unwrap();
        broker.bind("logs", "q", "").unwrap();
        broker.publish(PublishRequest::new("logs", "", "a")).unwrap();
        broker.publish(PublishRequest::new("logs", "", "b")).unwrap();

        assert_eq!(broker.delete_queue("q").await.unwrap(), 2);
        assert!(broker.bindings_for("logs").unwrap().is_empty());
        assert!(broker.publish(PublishRequest::new("logs", "", "c")).unwrap().is_empty());
        assert_eq!(
            broker.delete_queue("q").await.unwrap_err(),
            BrokerError::QueueNotFound("q".into())
        );
    }
}
