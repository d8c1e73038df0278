//! Sample topology and traffic.
//!
//! Declares one exchange of each kind with two queues apiece, attaches a
//! logging consumer to every queue and publishes five events:
//!
//! | exchange | kind   | queue            | pattern         |
//! |----------|--------|------------------|-----------------|
//! | logs     | fanout | log-event-q1     |                 |
//! | logs     | fanout | log-event-q2     |                 |
//! | orders   | direct | order-br-ok-q    | `order.br.ok`   |
//! | orders   | direct | order-us-fail-q  | `order.us.fail` |
//! | users    | topic  | user-any-ok-q    | `user.*.ok`     |
//! | users    | topic  | user-admin-all-q | `user.admin.#`  |

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::{Broker, BrokerError, PublishRequest};
use crate::queue::{ConsumeResult, Consumer, Delivery, Outcome};
use crate::routing::ExchangeKind;

/// Header naming the payload type.
pub const MESSAGE_TYPE_HEADER: &str = "message-type";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub id: String,
    pub country: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: String,
    pub name: String,
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

const TOPOLOGY: &[(&str, ExchangeKind, &str, &str)] = &[
    ("logs", ExchangeKind::Fanout, "log-event-q1", ""),
    ("logs", ExchangeKind::Fanout, "log-event-q2", ""),
    ("orders", ExchangeKind::Direct, "order-br-ok-q", "order.br.ok"),
    ("orders", ExchangeKind::Direct, "order-us-fail-q", "order.us.fail"),
    ("users", ExchangeKind::Topic, "user-any-ok-q", "user.*.ok"),
    ("users", ExchangeKind::Topic, "user-admin-all-q", "user.admin.#"),
];

/// Logs every delivery decoded as `T`.
///
/// Payloads that fail to decode are discarded rather than requeued, since
/// they would fail again.
pub struct EventLogger<T> {
    label: &'static str,
    _event: PhantomData<fn() -> T>,
}

impl<T> EventLogger<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            _event: PhantomData,
        }
    }
}

impl<T> Consumer for EventLogger<T>
where
    T: DeserializeOwned + fmt::Debug + Send + 'static,
{
    fn consume(&self, delivery: Delivery) -> BoxFuture<'static, ConsumeResult> {
        let label = self.label;
        async move {
            match serde_json::from_slice::<T>(delivery.payload()) {
                Ok(event) => {
                    tracing::info!(
                        queue = %delivery.queue,
                        routing_key = %delivery.routing_key(),
                        delivery_tag = %delivery.delivery_tag,
                        "[{label}] {event:?}"
                    );
                    Ok(Outcome::Ack)
                }
                Err(e) => {
                    tracing::warn!(queue = %delivery.queue, error = %e, "[{label}] undecodable payload");
                    Ok(Outcome::Nack { requeue: false })
                }
            }
        }
        .boxed()
    }
}

/// Declare the sample exchanges, queues and bindings. Idempotent.
pub fn declare_topology(broker: &Broker) -> Result<(), BrokerError> {
    for (exchange, kind, queue, pattern) in TOPOLOGY {
        broker.declare_exchange(exchange, *kind)?;
        broker.declare_queue(queue)?;
        broker.bind(exchange, queue, pattern)?;
    }
    Ok(())
}

/// Register a logging consumer on every sample queue.
pub fn attach_consumers(broker: &Broker) -> Result<(), BrokerError> {
    for (exchange, _, queue, _) in TOPOLOGY {
        match *exchange {
            "logs" => broker.register_consumer(queue, EventLogger::<LogEvent>::new("LogEvent"))?,
            "orders" => broker.register_consumer(queue, EventLogger::<OrderCreated>::new("OrderCreated"))?,
            _ => broker.register_consumer(queue, EventLogger::<UserCreated>::new("UserCreated"))?,
        };
    }
    Ok(())
}

fn request<T: Serialize>(
    exchange: &str,
    routing_key: &str,
    message_type: &str,
    event: &T,
) -> Result<PublishRequest, DemoError> {
    let payload = serde_json::to_vec(event)?;
    Ok(PublishRequest::new(exchange, routing_key, payload).with_header(MESSAGE_TYPE_HEADER, message_type))
}

/// The five sample publishes, in order.
pub fn sample_requests() -> Result<Vec<PublishRequest>, DemoError> {
    Ok(vec![
        request(
            "logs",
            "",
            "LogEvent",
            &LogEvent {
                text: "broadcast to fanout".into(),
            },
        )?,
        request(
            "orders",
            "order.br.ok",
            "OrderCreated",
            &OrderCreated {
                id: "7182".into(),
                country: "brazil".into(),
                success: true,
            },
        )?,
        request(
            "orders",
            "order.us.fail",
            "OrderCreated",
            &OrderCreated {
                id: "145236".into(),
                country: "united states".into(),
                success: true,
            },
        )?,
        request(
            "users",
            "user.admin.created.ok",
            "UserCreated",
            &UserCreated {
                id: "1237".into(),
                name: "Cesar Augusto".into(),
                success: true,
            },
        )?,
        request(
            "users",
            "user.simple.ok",
            "UserCreated",
            &UserCreated {
                id: "85697".into(),
                name: "Elba Reginao".into(),
                success: false,
            },
        )?,
    ])
}

/// Declare, attach, publish. Returns the delivered-to set of each publish.
///
/// Must be called from within a Tokio runtime.
pub fn run(broker: &Broker) -> Result<Vec<BTreeSet<String>>, DemoError> {
    declare_topology(broker)?;
    attach_consumers(broker)?;

    let mut results = Vec::new();
    for request in sample_requests()? {
        let exchange = request.exchange.clone();
        let routing_key = request.routing_key.clone();
        let delivered = broker.publish(request)?;
        tracing::info!(
            exchange = %exchange,
            routing_key = %routing_key,
            delivered_to = ?delivered,
            "Sample published"
        );
        results.push(delivered);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_sample_routing() {
        let broker = Broker::default();
        declare_topology(&broker).unwrap();

        let delivered: Vec<_> = sample_requests()
            .unwrap()
            .into_iter()
            .map(|r| broker.publish(r).unwrap())
            .collect();

        assert_eq!(
            delivered,
            vec![
                set(&["log-event-q1", "log-event-q2"]),
                set(&["order-br-ok-q"]),
                set(&["order-us-fail-q"]),
                set(&["user-admin-all-q"]),
                set(&["user-any-ok-q"]),
            ]
        );
    }

    #[test]
    fn test_topology_is_idempotent() {
        let broker = Broker::default();
        declare_topology(&broker).unwrap();
        declare_topology(&broker).unwrap();
        assert_eq!(broker.bindings_for("logs").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_drains_every_queue() {
        let broker = Broker::default();
        let results = run(&broker).unwrap();
        assert_eq!(results.iter().map(BTreeSet::len).sum::<usize>(), 6);

        for _ in 0..100 {
            let stats = broker.stats();
            if stats.queues.iter().all(|q| q.depth == 0 && q.unacked == 0) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(broker
            .stats()
            .queues
            .iter()
            .all(|q| q.depth == 0 && q.unacked == 0));
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_undecodable_payload_discarded() {
        let broker = Broker::default();
        declare_topology(&broker).unwrap();
        broker
            .register_consumer("order-br-ok-q", EventLogger::<OrderCreated>::new("OrderCreated"))
            .unwrap();
        broker
            .publish(PublishRequest::new("orders", "order.br.ok", "not json"))
            .unwrap();

        for _ in 0..100 {
            let stats = broker.queue_stats("order-br-ok-q").unwrap();
            if stats.depth == 0 && stats.unacked == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let stats = broker.queue_stats("order-br-ok-q").unwrap();
        assert_eq!((stats.depth, stats.unacked), (0, 0));
        broker.shutdown().await;
    }
}
