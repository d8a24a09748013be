//! Remote power-management agent library

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod platform;
pub mod security;

pub use config::schema::AgentConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
