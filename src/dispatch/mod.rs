//! Command dispatcher: the acknowledge-then-execute protocol.
//!
//! # Data Flow
//! ```text
//! POST /<action>
//!     → dry-run?  log + 200 {"status":"ok","action":A,"message":"dry-run"}
//!     → live:     200 {"status":"ok","action":A,"message":"executing"}
//!                 ── detached task ──▶ sleep(exec_delay) ──▶ PowerExecutor
//! ```
//!
//! # Design Decisions
//! - The acknowledgement is committed before the action runs: shutdown or
//!   logoff may kill this process before a post-hoc response could leave
//! - Deferred execution is fire-and-forget, at most once per accepted
//!   request; there is no return channel, so executor failures only reach
//!   the server log

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Json, Response};

use crate::http::response::ApiResponse;
use crate::platform::PowerExecutor;

/// The fixed set of power actions, bound to routes at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Shutdown,
    Restart,
    Hibernate,
    Sleep,
    Lock,
    Logoff,
    ScreenOff,
}

impl PowerAction {
    pub const ALL: [PowerAction; 7] = [
        PowerAction::Shutdown,
        PowerAction::Restart,
        PowerAction::Hibernate,
        PowerAction::Sleep,
        PowerAction::Lock,
        PowerAction::Logoff,
        PowerAction::ScreenOff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::Shutdown => "shutdown",
            PowerAction::Restart => "restart",
            PowerAction::Hibernate => "hibernate",
            PowerAction::Sleep => "sleep",
            PowerAction::Lock => "lock",
            PowerAction::Logoff => "logoff",
            PowerAction::ScreenOff => "screen-off",
        }
    }

    pub fn route_path(self) -> &'static str {
        match self {
            PowerAction::Shutdown => "/shutdown",
            PowerAction::Restart => "/restart",
            PowerAction::Hibernate => "/hibernate",
            PowerAction::Sleep => "/sleep",
            PowerAction::Lock => "/lock",
            PowerAction::Logoff => "/logoff",
            PowerAction::ScreenOff => "/screen-off",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PowerAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or(())
    }
}

/// Dispatcher shared by all power routes.
#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn PowerExecutor>,
    exec_delay: Duration,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn PowerExecutor>, exec_delay: Duration, dry_run: bool) -> Self {
        Self {
            executor,
            exec_delay,
            dry_run,
        }
    }

    /// Handle an accepted (authenticated, rate-admitted) power request.
    pub fn dispatch(&self, action: PowerAction) -> Response {
        if self.dry_run {
            tracing::info!(action = %action, "dry-run: would execute");
            return Json(ApiResponse::ok_action(action.as_str(), "dry-run")).into_response();
        }

        // The acknowledgement below is written before the action runs.
        // Give it a head start over the network, then hand the action to
        // the executor on its own task with no way back to this request.
        let executor = Arc::clone(&self.executor);
        let delay = self.exec_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result =
                tokio::task::spawn_blocking(move || executor.execute(action.as_str())).await;
            match result {
                Ok(Ok(())) => tracing::info!(action = %action, "power action executed"),
                Ok(Err(e)) => tracing::error!(action = %action, error = %e, "power action failed"),
                Err(e) => tracing::error!(action = %action, error = %e, "executor task panicked"),
            }
        });

        tracing::info!(action = %action, "executing");
        Json(ApiResponse::ok_action(action.as_str(), "executing")).into_response()
    }
}
