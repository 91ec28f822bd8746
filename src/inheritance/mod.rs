//! Inheritance resolution subsystem.
//!
//! # Data Flow
//! ```text
//! read (merged config / key / drift)
//!     → catalog environment_chain (root-first, cycle-checked)
//!     → version store current_items per chain link
//!     → resolver.rs overlay, later link overwrites earlier
//!     → ResolvedConfig { entries: key → { value, source }, chain }
//!
//! snapshot freeze
//!     → resolver.rs resolve → snapshot items
//! ```

pub mod resolver;

pub use resolver::{DriftReport, InheritanceResolver, KeyDrift, ResolvedConfig, ResolvedValue};
