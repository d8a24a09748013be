//! Logging setup.
//!
//! # Design Decisions
//! - One structured line per request via the HTTP trace layer; request
//!   ids correlate the access line with anything a handler logs
//! - Rate-limit rejections are not logged (see security/rate_limit.rs)
//! - Sink follows the run mode: stderr when interactive, the journal
//!   when supervised

pub mod logging;

pub use logging::init;
