//! Append-only configuration history.
//!
//! # Data Flow
//! ```text
//! item write (POST / PUT / DELETE)
//!     → store.rs append (scope lock, number = max + 1)
//!     → ConfigVersion pushed, ConfigItem projection updated
//!
//! rollback(key, v)
//!     → store.rs reads version v
//!     → UPDATE with v's value, or DELETE when v was a deletion,
//!       appended as a new forward version
//!
//! bulk import
//!     → store.rs append_batch (one lock, every request checked first)
//!
//! compare(a, b)
//!     → store.rs state_at(a), state_at(b)
//!     → diff.rs diff_maps
//! ```
//!
//! # Design Decisions
//! - Version numbers are per scope, so cross-key order inside a scope is comparable
//! - History is never rewritten; every undo is a new version

pub mod diff;
pub mod store;
pub mod types;

pub use diff::{diff_maps, ConfigDiff, ValueChange};
pub use store::VersionStore;
pub use types::{ChangeType, ConfigItem, ConfigVersion, NewVersion};
