//! Push distribution subsystem.
//!
//! # Data Flow
//! ```text
//! client socket (http/websocket.rs)
//!     → CLIENT_REGISTRATION → distributor.rs register → outbound queue
//!     → SUBSCRIBE(topic)    → topics.rs parse → topic index
//!     → HEARTBEAT           → last heartbeat refreshed
//!
//! snapshot publish (PublishListener)
//!     → distributor.rs notify(app, env)
//!     → topic index lookup (app + app/env topics, deduplicated)
//!     → try_send per connection (full / closed queue = failure)
//!     → notify_change on app/{app}/notifications
//!
//! liveness.rs (every sweep interval)
//!     → sweep_expired_at(now) → DISCONNECT frame → registry removal
//! ```
//!
//! # Design Decisions
//! - Registry keyed by connection id, plus topic → connection-id index
//! - Per-connection mutex for liveness and subscriptions, no global lock
//! - At-most-once delivery; reconnecting clients pull the published snapshot

pub mod connection;
pub mod distributor;
pub mod liveness;
pub mod protocol;
pub mod topics;

pub use connection::{ClientInfo, ConnectionId, Registration};
pub use distributor::{ConnectionStats, DeliveryReport, PushDistributor, Session};
pub use liveness::LivenessMonitor;
pub use protocol::{ClientMessage, ServerMessage};
pub use topics::Topic;
