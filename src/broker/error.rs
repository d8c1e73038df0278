//! Broker error definitions.

use thiserror::Error;

use crate::queue::{ConsumerTag, DeliveryTag};
use crate::routing::ExchangeKind;

/// Coarse classification of a [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed declaration: unknown exchange kind, bad pattern, empty name.
    Configuration,
    /// Redeclaration with different properties.
    Conflict,
    /// Reference to something that was never declared (or already removed).
    NotFound,
    /// The target is being torn down.
    Closed,
}

/// Errors returned synchronously by broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Exchange kind string is not one of `fanout`, `direct`, `topic`.
    #[error("unknown exchange kind '{0}'")]
    UnknownExchangeKind(String),

    /// Binding pattern rejected for the exchange kind.
    #[error("invalid binding pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    /// Exchange or queue declared with an empty name.
    #[error("{entity} name must not be empty")]
    EmptyName { entity: &'static str },

    /// Exchange already exists with another kind.
    #[error("exchange '{name}' already declared as {existing}, cannot redeclare as {requested}")]
    ExchangeConflict {
        name: String,
        existing: ExchangeKind,
        requested: ExchangeKind,
    },

    #[error("exchange '{0}' not found")]
    ExchangeNotFound(String),

    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    /// Ack/nack for a tag that is not pending on the queue.
    #[error("unknown delivery tag {tag} on queue '{queue}'")]
    UnknownDeliveryTag { queue: String, tag: DeliveryTag },

    #[error("unknown consumer '{tag}' on queue '{queue}'")]
    UnknownConsumer { queue: String, tag: ConsumerTag },

    /// Queue stopped accepting work.
    #[error("queue '{0}' is closed")]
    QueueClosed(String),
}

impl BrokerError {
    /// Map the error onto its class.
    pub fn class(&self) -> ErrorClass {
        match self {
            BrokerError::UnknownExchangeKind(_)
            | BrokerError::InvalidPattern { .. }
            | BrokerError::EmptyName { .. } => ErrorClass::Configuration,
            BrokerError::ExchangeConflict { .. } => ErrorClass::Conflict,
            BrokerError::ExchangeNotFound(_)
            | BrokerError::QueueNotFound(_)
            | BrokerError::UnknownDeliveryTag { .. }
            | BrokerError::UnknownConsumer { .. } => ErrorClass::NotFound,
            BrokerError::QueueClosed(_) => ErrorClass::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            BrokerError::UnknownExchangeKind("headers".into()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            BrokerError::ExchangeConflict {
                name: "logs".into(),
                existing: ExchangeKind::Fanout,
                requested: ExchangeKind::Topic,
            }
            .class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            BrokerError::ExchangeNotFound("missing".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(BrokerError::QueueClosed("q".into()).class(), ErrorClass::Closed);
    }

    #[test]
    fn test_conflict_display() {
        let err = BrokerError::ExchangeConflict {
            name: "logs".into(),
            existing: ExchangeKind::Fanout,
            requested: ExchangeKind::Direct,
        };
        assert_eq!(
            err.to_string(),
            "exchange 'logs' already declared as fanout, cannot redeclare as direct"
        );
    }
}
