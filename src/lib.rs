//! Centralized configuration service library

// Core subsystems
pub mod catalog;
pub mod inheritance;
pub mod snapshots;
pub mod versioning;

// Distribution
pub mod push;

// Service surface
pub mod admin;
pub mod api;
pub mod center;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod storage;

pub use center::{ClientConfig, ConfigCenter, ImportReport};
pub use config::schema::ServiceConfig;
pub use error::{ConfigCenterError, ConfigResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
