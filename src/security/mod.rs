//! Request guards.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → allowlist.rs (CIDR filter, outermost, only if configured)
//!     → auth.rs (client certificate, else bearer token)
//!     → rate_limit.rs (token bucket, power routes only)
//!     → dispatcher
//! ```
//!
//! # Design Decisions
//! - Every auth and allowlist decision is logged with the remote address
//! - Rate-limit rejections are intentionally silent (flood protection)
//! - No sessions: each request is authenticated on its own

pub mod allowlist;
pub mod auth;
pub mod rate_limit;

pub use allowlist::Allowlist;
pub use auth::{AuthState, ClientIdentity};
pub use rate_limit::PowerRateLimiter;
