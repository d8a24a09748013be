//! HTTP surface of the agent.
//!
//! # Data Flow
//! ```text
//! TLS connection (net/)
//!     → server.rs (router, guard chain, serve loop)
//!     → handlers.rs (/health, /stats) or dispatch/ (power routes)
//!     → response.rs (uniform JSON envelope)
//! ```
//!
//! # Design Decisions
//! - Every response body, including errors, uses the same JSON envelope
//! - Power routes are a fixed table built from the action enum; there is
//!   no generic "run this command" endpoint
//! - Guards compose as layers: allowlist outermost, then auth, then rate
//!   limit, so a blocked source never reaches the token bucket

pub mod handlers;
pub mod response;
pub mod server;

pub use response::ApiResponse;
pub use server::{AppState, HttpServer, ServeError, ServeOutcome};
