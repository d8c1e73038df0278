//! Per-exchange binding table.
//!
//! # Responsibilities
//! - Store the (queue, pattern) bindings of one exchange
//! - Serialize bind/unbind against each other
//! - Hand out point-in-time snapshots to the dispatcher
//!
//! # Design Decisions
//! - Copy-on-write: every mutation publishes a fresh immutable `Vec` through
//!   `ArcSwap`, so a publish never observes half of a rebinding and never
//!   waits on a writer
//! - Identical (queue, pattern) pairs are stored once

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;

/// A rule connecting an exchange to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Binding {
    pub exchange: String,
    pub queue: String,
    pub pattern: String,
}

impl Binding {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            pattern: pattern.into(),
        }
    }

    fn same_target(&self, queue: &str, pattern: &str) -> bool {
        self.queue == queue && self.pattern == pattern
    }
}

/// Bindings of a single exchange.
#[derive(Debug)]
pub struct BindingTable {
    current: ArcSwap<Vec<Binding>>,
    writer: Mutex<()>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Add a binding. Returns false if the identical binding already exists.
    pub fn insert(&self, binding: Binding) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load();
        if current.contains(&binding) {
            return false;
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(binding);
        self.current.store(Arc::new(next));
        true
    }

    /// Remove the (queue, pattern) binding. Returns false if it was absent.
    pub fn remove(&self, queue: &str, pattern: &str) -> bool {
        self.retain(|b| !b.same_target(queue, pattern)) > 0
    }

    /// Remove every binding targeting `queue`, returning how many were dropped.
    pub fn remove_queue(&self, queue: &str) -> usize {
        self.retain(|b| b.queue != queue)
    }

    fn retain(&self, keep: impl Fn(&Binding) -> bool) -> usize {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load();
        let next: Vec<Binding> = current.iter().filter(|b| keep(b)).cloned().collect();
        let removed = current.len() - next.len();
        if removed > 0 {
            self.current.store(Arc::new(next));
        }
        removed
    }

    /// Consistent view of the table at this instant.
    pub fn snapshot(&self) -> Arc<Vec<Binding>> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new()
    }
}
