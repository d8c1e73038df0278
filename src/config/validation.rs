//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (bindings reference declared exchanges and queues)
//! - Validate binding patterns against the exchange kind
//! - Validate addresses and ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BrokerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::BrokerConfig;
use crate::routing::matcher;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("exchange #{0} has an empty name")]
    EmptyExchangeName(usize),

    #[error("exchange '{0}' declared more than once")]
    DuplicateExchange(String),

    #[error("queue #{0} has an empty name")]
    EmptyQueueName(usize),

    #[error("queue '{0}' declared more than once")]
    DuplicateQueue(String),

    #[error("binding #{index} references unknown exchange '{exchange}'")]
    UnknownExchange { index: usize, exchange: String },

    #[error("binding #{index} references unknown queue '{queue}'")]
    UnknownQueue { index: usize, queue: String },

    #[error("binding #{index}: {reason}")]
    InvalidPattern { index: usize, reason: String },

    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("admin API enabled without an api_key")]
    MissingApiKey,

    #[error("max_delay_ms ({max}) must be at least base_delay_ms ({base})")]
    BackoffRange { base: u64, max: u64 },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut exchanges = HashMap::new();
    for (index, exchange) in config.exchanges.iter().enumerate() {
        if exchange.name.is_empty() {
            errors.push(ValidationError::EmptyExchangeName(index));
        } else if exchanges.insert(exchange.name.as_str(), exchange.kind).is_some() {
            errors.push(ValidationError::DuplicateExchange(exchange.name.clone()));
        }
    }

    let mut queues = HashSet::new();
    for (index, queue) in config.queues.iter().enumerate() {
        if queue.name.is_empty() {
            errors.push(ValidationError::EmptyQueueName(index));
        } else if !queues.insert(queue.name.as_str()) {
            errors.push(ValidationError::DuplicateQueue(queue.name.clone()));
        }
    }

    for (index, binding) in config.bindings.iter().enumerate() {
        match exchanges.get(binding.exchange.as_str()) {
            Some(kind) => {
                if let Err(e) = matcher::validate_pattern(*kind, &binding.pattern) {
                    errors.push(ValidationError::InvalidPattern {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
            None => errors.push(ValidationError::UnknownExchange {
                index,
                exchange: binding.exchange.clone(),
            }),
        }
        if !queues.contains(binding.queue.as_str()) {
            errors.push(ValidationError::UnknownQueue {
                index,
                queue: binding.queue.clone(),
            });
        }
    }

    let delivery = &config.delivery;
    if delivery.base_delay_ms > 0 && delivery.max_delay_ms < delivery.base_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: delivery.base_delay_ms,
            max: delivery.max_delay_ms,
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: "admin",
                value: config.admin.bind_address.clone(),
            });
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
