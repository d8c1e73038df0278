//! Publish path: exchange lookup, binding evaluation and fan-out.

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use uuid::Uuid;

use crate::broker::BrokerError;
use crate::observability::metrics;
use crate::queue::{Message, QueueTable};
use crate::routing::{matcher, ExchangeRegistry};

/// A message as submitted by a producer.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
}

impl PublishRequest {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Routes one publish into every matching queue.
///
/// Borrowed from the [`Broker`](crate::broker::Broker); holds no state of
/// its own.
pub struct Dispatcher<'a> {
    exchanges: &'a ExchangeRegistry,
    queues: &'a QueueTable,
}

impl<'a> Dispatcher<'a> {
    pub fn new(exchanges: &'a ExchangeRegistry, queues: &'a QueueTable) -> Self {
        Self { exchanges, queues }
    }

    /// Publish a message and return the set of queues it was delivered to.
    ///
    /// Bindings are read from a single snapshot taken at call time. Each
    /// target queue receives its own copy exactly once, even when several
    /// bindings select it. An empty set means the message was unroutable and
    /// has been dropped.
    pub fn publish(&self, request: PublishRequest) -> Result<BTreeSet<String>, BrokerError> {
        let exchange = self.exchanges.get(&request.exchange)?;
        let snapshot = exchange.bindings().snapshot();

        let targets: BTreeSet<&str> = snapshot
            .iter()
            .filter(|b| matcher::matches(exchange.kind(), &b.pattern, &request.routing_key))
            .map(|b| b.queue.as_str())
            .collect();

        let message = Message {
            message_id: Uuid::new_v4(),
            exchange: request.exchange,
            routing_key: request.routing_key,
            payload: request.payload,
            headers: request.headers,
            published_at: SystemTime::now(),
        };

        let mut delivered = BTreeSet::new();
        for name in targets {
            // Queue removed between bind and publish
            let Ok(queue) = self.queues.get(name) else {
                continue;
            };
            match queue.enqueue(message.clone()) {
                Ok(_) => {
                    delivered.insert(name.to_string());
                }
                Err(e) => tracing::debug!(queue = %name, error = %e, "Skipping queue"),
            }
        }

        metrics::record_published(exchange.name(), delivered.len());
        if delivered.is_empty() {
            tracing::debug!(
                exchange = %exchange.name(),
                routing_key = %message.routing_key,
                message_id = %message.message_id,
                "Message unroutable, dropped"
            );
        } else {
            tracing::trace!(
                exchange = %exchange.name(),
                routing_key = %message.routing_key,
                message_id = %message.message_id,
                queues = delivered.len(),
                "Message routed"
            );
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::BoundedRedelivery;
    use crate::routing::ExchangeKind;
    use std::sync::Arc;

    fn setup() -> (ExchangeRegistry, QueueTable) {
        let exchanges = ExchangeRegistry::new();
        let queues = QueueTable::new(Arc::new(BoundedRedelivery::default()));
        (exchanges, queues)
    }

    #[test]
    fn test_unknown_exchange() {
        let (exchanges, queues) = setup();
        let err = Dispatcher::new(&exchanges, &queues)
            .publish(PublishRequest::new("nope", "", "x"))
            .unwrap_err();
        assert_eq!(err, BrokerError::ExchangeNotFound("nope".into()));
    }

    #[test]
    fn test_overlapping_bindings_deliver_once() {
        let (exchanges, queues) = setup();
        let users = exchanges.declare("users", ExchangeKind::Topic).unwrap();
        let q = queues.declare("q").unwrap();
        users.bind("q", "user.*.ok").unwrap();
        users.bind("q", "user.#").unwrap();

        let delivered = Dispatcher::new(&exchanges, &queues)
            .publish(PublishRequest::new("users", "user.admin.ok", "x"))
            .unwrap();
        assert_eq!(delivered, BTreeSet::from(["q".to_string()]));
        assert_eq!(q.depth(), 1);
    }

    #[test]
    fn test_copies_share_message_id() {
        let (exchanges, queues) = setup();
        let logs = exchanges.declare("logs", ExchangeKind::Fanout).unwrap();
        let q1 = queues.declare("q1").unwrap();
        let q2 = queues.declare("q2").unwrap();
        logs.bind("q1", "").unwrap();
        logs.bind("q2", "").unwrap();

        let request = PublishRequest::new("logs", "", "hello").with_header("message-type", "LogEvent");
        let delivered = Dispatcher::new(&exchanges, &queues).publish(request).unwrap();
        assert_eq!(delivered.len(), 2);

        let a = q1.fetch().unwrap().unwrap();
        let b = q2.fetch().unwrap().unwrap();
        assert_eq!(a.message.message_id, b.message.message_id);
        assert_eq!(a.header("message-type"), Some("LogEvent"));
        assert_eq!(b.payload(), b"hello");
    }

    #[test]
    fn test_closed_and_missing_queues_skipped() {
        let (exchanges, queues) = setup();
        let logs = exchanges.declare("logs", ExchangeKind::Fanout).unwrap();
        let open = queues.declare("open").unwrap();
        let closed = queues.declare("closed").unwrap();
        closed.close();
        logs.bind("open", "").unwrap();
        logs.bind("closed", "").unwrap();
        logs.bind("ghost", "").unwrap();

        let delivered = Dispatcher::new(&exchanges, &queues)
            .publish(PublishRequest::new("logs", "", "x"))
            .unwrap();
        assert_eq!(delivered, BTreeSet::from(["open".to_string()]));
        assert_eq!(open.depth(), 1);
    }
}
