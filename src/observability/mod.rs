//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Broker, queues and delivery loops produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters and gauges per exchange/queue)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (broker stats, see admin/)
//! ```

pub mod logging;
pub mod metrics;
