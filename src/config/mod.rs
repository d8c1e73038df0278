//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BrokerConfig (validated, immutable)
//!     → lifecycle::startup applies the topology to a Broker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; topology changes after startup go
//!   through the Broker API
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::AdminConfig;
pub use schema::BindingConfig;
pub use schema::BrokerConfig;
pub use schema::DeliveryConfig;
pub use schema::ExchangeConfig;
pub use schema::ObservabilityConfig;
pub use schema::QueueConfig;
