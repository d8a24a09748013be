//! Platform capability layer.
//!
//! Protocol logic never touches the OS directly; it goes through these two
//! traits, with one implementation per target platform selected at build
//! time. Tests substitute recording fakes.

use serde::Serialize;
use std::sync::Arc;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

/// Executes a power action on the host.
///
/// Takes the action *name* rather than the routing enum: the route table is
/// fixed, but the executor boundary still rejects anything it does not
/// recognize (defense in depth against future mis-wiring).
pub trait PowerExecutor: Send + Sync + 'static {
    fn execute(&self, action: &str) -> Result<(), ExecutorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("failed to spawn command for {action}: {source}")]
    Spawn {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("command for {action} exited with {status}")]
    CommandFailed {
        action: &'static str,
        status: std::process::ExitStatus,
    },
}

/// Supplies host metrics for /stats.
pub trait StatsProvider: Send + Sync + 'static {
    fn snapshot(&self) -> Result<SystemStats, StatsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("stats collection failed: {0}")]
    Collection(String),
}

/// Host metrics reported by /stats.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SystemStats {
    pub cpu_usage_percent: f64,
    pub memory_total_bytes: u64,
    pub memory_free_bytes: u64,
    pub memory_used_bytes: u64,
    pub uptime_seconds: u64,
}

/// The executor for the build target.
pub fn system_executor() -> Arc<dyn PowerExecutor> {
    #[cfg(unix)]
    {
        Arc::new(unix::UnixExecutor)
    }
    #[cfg(windows)]
    {
        Arc::new(windows::WindowsExecutor)
    }
}

/// The stats provider for the build target.
pub fn system_stats_provider() -> Arc<dyn StatsProvider> {
    Arc::new(sysinfo_stats::SysinfoStats::new())
}

mod sysinfo_stats {
    use super::{StatsError, StatsProvider, SystemStats};
    use std::sync::Mutex;
    use sysinfo::System;

    /// Stats provider backed by the `sysinfo` crate.
    ///
    /// The `System` handle is kept across calls so CPU usage is computed
    /// against the previous refresh instead of always reading zero.
    pub struct SysinfoStats {
        system: Mutex<System>,
    }

    impl SysinfoStats {
        pub fn new() -> Self {
            let mut system = System::new();
            system.refresh_cpu_usage();
            system.refresh_memory();
            Self {
                system: Mutex::new(system),
            }
        }
    }

    impl StatsProvider for SysinfoStats {
        fn snapshot(&self) -> Result<SystemStats, StatsError> {
            let mut system = self
                .system
                .lock()
                .map_err(|_| StatsError::Collection("stats mutex poisoned".into()))?;

            system.refresh_cpu_usage();
            system.refresh_memory();

            let total = system.total_memory();
            let free = system.free_memory();

            Ok(SystemStats {
                cpu_usage_percent: f64::from(system.global_cpu_info().cpu_usage()),
                memory_total_bytes: total,
                memory_free_bytes: free,
                memory_used_bytes: total.saturating_sub(free),
                uptime_seconds: System::uptime(),
            })
        }
    }

}
