//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → metrics → ConfigCenter → restore state → watcher / flusher → listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server stops accepting, push clients
//!     disconnected, liveness monitor exits, final state flush
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - One broadcast channel; every background task subscribes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
