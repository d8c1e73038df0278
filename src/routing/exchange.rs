//! Exchanges and the exchange registry.
//!
//! # Responsibilities
//! - Name → exchange lookup
//! - Enforce immutable kind (redeclare with another kind is a conflict)
//! - Validate and normalize bindings before they reach the table
//!
//! # Design Decisions
//! - The kind set is closed, so it is an enum consumed by `matcher::matches`
//! - `DashMap` shards the registry; operations on different exchanges do not
//!   contend on a global lock
//! - Fanout patterns are stored as `""` so a queue is bound at most once

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::broker::BrokerError;
use crate::routing::binding::{Binding, BindingTable};
use crate::routing::matcher;

/// Exchange routing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExchangeKind {
    Fanout,
    Direct,
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fanout" => Ok(ExchangeKind::Fanout),
            "direct" => Ok(ExchangeKind::Direct),
            "topic" => Ok(ExchangeKind::Topic),
            _ => Err(BrokerError::UnknownExchangeKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for ExchangeKind {
    type Error = BrokerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExchangeKind> for String {
    fn from(kind: ExchangeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A named routing entity.
#[derive(Debug)]
pub struct Exchange {
    name: String,
    kind: ExchangeKind,
    bindings: BindingTable,
}

impl Exchange {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bindings: BindingTable::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Validate `pattern` for this exchange's kind and store the binding.
    ///
    /// Returns false when the identical binding already existed.
    pub fn bind(&self, queue: &str, pattern: &str) -> Result<bool, BrokerError> {
        matcher::validate_pattern(self.kind, pattern)?;
        let pattern = match self.kind {
            ExchangeKind::Fanout => "",
            ExchangeKind::Direct | ExchangeKind::Topic => pattern,
        };
        Ok(self.bindings.insert(Binding::new(&self.name, queue, pattern)))
    }

    /// Remove the (queue, pattern) binding. Absent bindings are a no-op.
    pub fn unbind(&self, queue: &str, pattern: &str) -> bool {
        let pattern = match self.kind {
            ExchangeKind::Fanout => "",
            ExchangeKind::Direct | ExchangeKind::Topic => pattern,
        };
        self.bindings.remove(queue, pattern)
    }
}

/// All declared exchanges.
#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    exchanges: DashMap<String, Arc<Exchange>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an exchange. Idempotent when the kind matches.
    pub fn declare(&self, name: &str, kind: ExchangeKind) -> Result<Arc<Exchange>, BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::EmptyName { entity: "exchange" });
        }

        match self.exchanges.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.kind() == kind {
                    Ok(existing.clone())
                } else {
                    Err(BrokerError::ExchangeConflict {
                        name: name.to_string(),
                        existing: existing.kind(),
                        requested: kind,
                    })
                }
            }
            Entry::Vacant(slot) => {
                let exchange = Arc::new(Exchange::new(name, kind));
                slot.insert(exchange.clone());
                tracing::info!(exchange = %name, kind = %kind, "Exchange declared");
                Ok(exchange)
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<Exchange>, BrokerError> {
        self.exchanges
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| BrokerError::ExchangeNotFound(name.to_string()))
    }

    /// Remove an exchange. Publishes already holding it finish normally.
    pub fn remove(&self, name: &str) -> Result<Arc<Exchange>, BrokerError> {
        self.exchanges
            .remove(name)
            .map(|(_, exchange)| exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(name.to_string()))
    }

    /// Drop every binding that targets `queue`, across all exchanges.
    pub fn unbind_queue(&self, queue: &str) -> usize {
        self.all()
            .iter()
            .map(|exchange| exchange.bindings().remove_queue(queue))
            .sum()
    }

    /// Every exchange, sorted by name.
    pub fn all(&self) -> Vec<Arc<Exchange>> {
        let mut all: Vec<Arc<Exchange>> = self.exchanges.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
