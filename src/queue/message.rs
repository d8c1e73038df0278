//! Message and delivery types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::Serialize;
use uuid::Uuid;

/// Identifier of one enqueued message instance within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DeliveryTag {
    fn from(tag: u64) -> Self {
        Self(tag)
    }
}

/// Immutable published content plus routing metadata.
///
/// Every target queue receives its own clone; nothing is shared between
/// queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Shared by every copy produced from one publish.
    pub message_id: Uuid,
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub published_at: SystemTime,
}

/// A message handed to a consumer (or returned from a fetch).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub delivery_tag: DeliveryTag,
    /// True when this message was delivered before and requeued.
    pub redelivered: bool,
    /// Number of deliveries including this one.
    pub delivery_count: u32,
    pub message: Message,
}

impl Delivery {
    pub fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.message.payload).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.message.headers.get(name).map(String::as_str)
    }
}

/// Queue-owned wrapper tracking delivery attempts.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub tag: DeliveryTag,
    pub delivery_count: u32,
    pub message: Message,
}

impl Envelope {
    pub fn to_delivery(&self, queue: &str) -> Delivery {
        Delivery {
            queue: queue.to_string(),
            delivery_tag: self.tag,
            redelivered: self.delivery_count > 1,
            delivery_count: self.delivery_count,
            message: self.message.clone(),
        }
    }
}
