//! Snapshot management subsystem.
//!
//! # Data Flow
//! ```text
//! create_staged(scope)
//!     → inheritance resolver (merged view) or flattened JSON document
//!     → manager.rs stage under scope lock (previous draft → DISCARDED)
//!
//! publish(id)
//!     → manager.rs scope lock
//!     → validation.rs (empty / duplicate keys, null placeholders)
//!     → previous PUBLISHED → SUPERSEDED, candidate → PUBLISHED
//!     → PublishListener (push distributor) while still locked
//!
//! file import (json / yaml / properties)
//!     → import.rs parse_document → flattened items
//!     → validation.rs, then written as item versions by the caller
//!
//! rollback_to_snapshot(scope, id)
//!     → new staged copy of the historical items → publish, same lock
//! ```
//!
//! # Design Decisions
//! - Snapshots are never deleted; only their status moves forward
//! - At most one STAGED and one PUBLISHED snapshot per scope

pub mod import;
pub mod manager;
pub mod types;
pub mod validation;

pub use import::{parse_document, ImportFormat};
pub use manager::{PublishListener, SnapshotComparison, SnapshotManager};
pub use types::{ConfigSnapshot, SnapshotDraft, SnapshotItem, SnapshotStatistics, SnapshotStatus};
