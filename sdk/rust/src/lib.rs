//! Client SDK for the config center.
//!
//! ```text
//! ClientSession ──ws──▶ /ws          (register, subscribe, heartbeat, pushes)
//!       │
//!       └──http──▶ /api/client/configs/{app}/{env}   (pull on connect / on notification)
//!       │
//!       ▼
//! LocalConfigStore  (whole-scope replace, read by the embedding application)
//!       │
//!       ▼
//! ConfigCache       (optional JSON file, loaded on start when offline)
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod protocol;
pub mod session;
pub mod store;

pub use cache::ConfigCache;
pub use client::{ClientConfigResponse, ConfigClient};
pub use error::{SdkError, SdkResult};
pub use session::{
    ClientSession, ReconnectDecision, ReconnectPolicy, ReconnectTracker, SessionConfig, SessionEvent, SessionHandle,
    SessionState,
};
pub use store::{ConfigState, LocalConfigStore};
