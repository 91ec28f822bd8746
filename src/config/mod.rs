//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → mpsc channel → HTTP server loop
//!     → atomic swap of the push policy (ArcSwap<PushConfig>)
//! ```
//!
//! # Design Decisions
//! - Only the `[push]` section is hot-reloadable; the rest needs a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, ListenerConfig, ObservabilityConfig, PushConfig, ServiceConfig, StorageConfig, TimeoutConfig,
};
pub use watcher::{plan_reload, ConfigWatcher, ReloadPlan};
