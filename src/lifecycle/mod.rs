//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build broker → Apply topology
//!
//! Demo (demo.rs):
//!     Sample topology → Logging consumers → Five sample publishes
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Trigger broadcast → Stop delivery loops → Drain in-flight → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then broker, then listeners
//! - Ordered shutdown: stop admin, stop delivery, wait for consumers

pub mod demo;
pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{apply_topology, build_broker};
