//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Consumer nacks with requeue (or fails):
//!     → delivery::policy (bounded redelivery decision)
//!     → backoff.rs (delay before the message re-enters its queue)
//! ```

pub mod backoff;
