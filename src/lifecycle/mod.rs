//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse flags → load config → validate → build TLS/allowlist → bind
//!
//! Control (service.rs):
//!     signals.rs / supervisor → ServiceControl channel → state machine
//!     Starting → Running → StopPending → Stopped
//!
//! Shutdown (shutdown.rs):
//!     StopPending → broadcast → listener stops accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - One typed control channel drives the state machine in both modes
//! - Transitions are monotonic; exactly one shutdown sequence per process
//! - Shutdown has a timeout: remaining connections are force-closed

pub mod install;
pub mod service;
pub mod shutdown;
pub mod signals;

pub use service::{LifecycleManager, LifecycleMode, LifecycleState, ServiceControl};
pub use shutdown::Shutdown;
