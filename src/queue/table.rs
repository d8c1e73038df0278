//! Name → queue table.

use std::sync::Arc;

use dashmap::DashMap;

use crate::broker::BrokerError;
use crate::delivery::policy::RedeliveryPolicy;
use crate::queue::buffer::Queue;

/// All declared queues, sharing one redelivery policy.
#[derive(Debug)]
pub struct QueueTable {
    queues: DashMap<String, Arc<Queue>>,
    policy: Arc<dyn RedeliveryPolicy>,
}

impl QueueTable {
    pub fn new(policy: Arc<dyn RedeliveryPolicy>) -> Self {
        Self {
            queues: DashMap::new(),
            policy,
        }
    }

    /// Declare a queue. Redeclaring returns the existing one.
    pub fn declare(&self, name: &str) -> Result<Arc<Queue>, BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::EmptyName { entity: "queue" });
        }

        let queue = self
            .queues
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(queue = %name, "Queue declared");
                Arc::new(Queue::new(name, self.policy.clone()))
            })
            .value()
            .clone();
        Ok(queue)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Queue>, BrokerError> {
        self.queues
            .get(name)
            .map(|q| q.value().clone())
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Result<Arc<Queue>, BrokerError> {
        self.queues
            .remove(name)
            .map(|(_, queue)| queue)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))
    }

    /// Every queue, sorted by name.
    pub fn all(&self) -> Vec<Arc<Queue>> {
        let mut all: Vec<Arc<Queue>> = self.queues.iter().map(|q| q.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::policy::BoundedRedelivery;

    #[test]
    fn test_declare_idempotent() {
        let table = QueueTable::new(Arc::new(BoundedRedelivery::default()));
        let first = table.declare("q1").unwrap();
        let second = table.declare("q1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_and_empty() {
        let table = QueueTable::new(Arc::new(BoundedRedelivery::default()));
        assert_eq!(
            table.declare("").unwrap_err(),
            BrokerError::EmptyName { entity: "queue" }
        );
        assert!(matches!(table.get("nope"), Err(BrokerError::QueueNotFound(_))));
        assert!(matches!(table.remove("nope"), Err(BrokerError::QueueNotFound(_))));
    }
}
