//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, trace span, request metrics)
//!     → api/ and admin/ handlers → ConfigCenter
//!     → response.rs (domain error → status + JSON body)
//!
//! GET /ws
//!     → websocket.rs upgrade → push session loop
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
