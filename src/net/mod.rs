//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (handshake, peer identity extraction)
//!     → Hand off to HTTP layer with ClientIdentity + remote address
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - TLS is mandatory; plaintext is never served
//! - The verified peer certificate becomes a per-connection identity,
//!   injected into every request on that connection

pub mod listener;
pub mod tls;

pub use listener::BoundedListener;
pub use tls::{build_server_config, peer_identity, TlsError};
