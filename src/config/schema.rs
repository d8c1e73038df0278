//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the broker,
//! including the declarative topology applied at startup. All types derive
//! Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

use crate::delivery::policy::RequeuePosition;
use crate::routing::ExchangeKind;

/// Root configuration for the broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Redelivery settings shared by every queue.
    pub delivery: DeliveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Exchanges declared at startup.
    pub exchanges: Vec<ExchangeConfig>,

    /// Queues declared at startup.
    pub queues: Vec<QueueConfig>,

    /// Bindings created at startup.
    pub bindings: Vec<BindingConfig>,
}

/// Redelivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum redeliveries per message (0 = unlimited).
    pub max_redeliveries: u32,

    /// Where requeued messages re-enter the queue.
    pub requeue_position: RequeuePosition,

    /// Base delay before a requeue in milliseconds (0 = immediate).
    pub base_delay_ms: u64,

    /// Maximum requeue delay in milliseconds.
    pub max_delay_ms: u64,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Exchange declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// Unique exchange name.
    pub name: String,

    /// `fanout`, `direct` or `topic`.
    pub kind: ExchangeKind,
}

/// Queue declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Unique queue name.
    pub name: String,
}

/// Binding declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    /// Source exchange.
    pub exchange: String,

    /// Target queue.
    pub queue: String,

    /// Routing key (direct) or pattern (topic); ignored for fanout.
    #[serde(default, alias = "routing_key")]
    pub pattern: String,
}
