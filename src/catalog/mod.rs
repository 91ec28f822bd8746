//! Application and environment catalog.
//!
//! # Data Flow
//! ```text
//! admin write (create app / env, re-parent)
//!     → registry.rs (per-application lock, cycle check)
//!     → Environment forest
//!
//! inheritance resolver
//!     → registry.rs environment_chain (root-first ancestor list)
//! ```

pub mod registry;
pub mod types;

pub use registry::Catalog;
pub use types::{Application, ApplicationId, Environment, EnvironmentId, Scope};
