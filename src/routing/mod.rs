//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Publish (exchange, routing key)
//!     → exchange.rs (registry lookup, kind)
//!     → binding.rs (point-in-time snapshot of bindings)
//!     → matcher.rs (evaluate each binding pattern)
//!     → Return: matching queue names
//!
//! Topology changes:
//!     declare / bind / unbind
//!     → validate pattern for the exchange kind
//!     → publish a new binding snapshot
//! ```
//!
//! # Design Decisions
//! - Exchange kind is fixed at declaration
//! - Bindings are evaluated at publish time only; later changes never touch
//!   messages already enqueued
//! - No regex: patterns are dot-segmented with `*` and `#` wildcards

pub mod binding;
pub mod exchange;
pub mod matcher;

pub use binding::{Binding, BindingTable};
pub use exchange::{Exchange, ExchangeKind, ExchangeRegistry};
