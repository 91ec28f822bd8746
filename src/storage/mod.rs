//! Durable state persistence.
//!
//! # Data Flow
//! ```text
//! startup
//!     → state_file.rs load → ConfigCenter::restore_state
//!       (catalog records, version replay, snapshot id counter resume)
//!
//! flusher.rs (every flush interval, and on shutdown)
//!     → ConfigCenter::export_state → state_file.rs save (temp + rename)
//! ```

pub mod flusher;
pub mod state_file;

pub use flusher::StateFlusher;
pub use state_file::{PersistedState, StateFile, StorageError};
