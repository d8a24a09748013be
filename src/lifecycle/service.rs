//! Lifecycle control loop.
//!
//! The process moves through `Starting → Running → StopPending → Stopped`,
//! strictly in that order, and only this module mutates the state. Control
//! messages arrive on one typed channel regardless of where they originate
//! (OS signals in interactive mode, the supervisor in managed mode), which
//! keeps the state machine itself platform-neutral and testable.

use std::future::Future;

use tokio::sync::{mpsc, oneshot, watch};

use crate::lifecycle::shutdown::Shutdown;

/// Process lifecycle state. Transitions are strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Running,
    StopPending,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::StopPending => "stop-pending",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How the process is being supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleMode {
    /// Foreground process; stop via SIGINT/SIGTERM.
    Interactive,
    /// Under a service supervisor; report status transitions back.
    Managed,
}

impl LifecycleMode {
    /// Detect the operating mode. `force_managed` comes from `--service`.
    pub fn detect(force_managed: bool) -> Self {
        if force_managed || supervised_by_system() {
            LifecycleMode::Managed
        } else {
            LifecycleMode::Interactive
        }
    }
}

#[cfg(unix)]
fn supervised_by_system() -> bool {
    std::env::var_os("NOTIFY_SOCKET").is_some()
}

#[cfg(not(unix))]
fn supervised_by_system() -> bool {
    false
}

/// Typed control messages driving the state machine.
#[derive(Debug)]
pub enum ServiceControl {
    /// Graceful stop request.
    Stop,
    /// Host is going down; same handling as Stop.
    Shutdown,
    /// Status query; replies with the current state.
    Interrogate(oneshot::Sender<LifecycleState>),
}

/// Owns the lifecycle state and runs the control loop.
pub struct LifecycleManager {
    mode: LifecycleMode,
    state: LifecycleState,
    state_tx: watch::Sender<LifecycleState>,
    shutdown: Shutdown,
}

impl LifecycleManager {
    pub fn new(mode: LifecycleMode, shutdown: Shutdown) -> (Self, watch::Receiver<LifecycleState>) {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Starting);
        (
            Self {
                mode,
                state: LifecycleState::Starting,
                state_tx,
                shutdown,
            },
            state_rx,
        )
    }

    pub fn mode(&self) -> LifecycleMode {
        self.mode
    }

    /// Advance the state machine. Backwards or repeated transitions are
    /// rejected, which is what guarantees a single shutdown sequence.
    fn transition(&mut self, next: LifecycleState) -> bool {
        if next <= self.state {
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
        let _ = self.state_tx.send(next);
        self.notify_supervisor(next);
        true
    }

    #[cfg(unix)]
    fn notify_supervisor(&self, state: LifecycleState) {
        if self.mode != LifecycleMode::Managed {
            return;
        }
        use sd_notify::NotifyState;
        let result = match state {
            LifecycleState::Running => sd_notify::notify(false, &[NotifyState::Ready]),
            LifecycleState::StopPending => sd_notify::notify(false, &[NotifyState::Stopping]),
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "supervisor notification failed");
        }
    }

    #[cfg(not(unix))]
    fn notify_supervisor(&self, _state: LifecycleState) {}

    /// Drive the server future while reacting to control messages.
    ///
    /// The server future is expected to complete once the shutdown signal
    /// fires and its drain finishes; this loop keeps polling it after a
    /// stop request instead of abandoning it.
    pub async fn run<F, T, E>(
        mut self,
        server: F,
        mut controls: mpsc::Receiver<ServiceControl>,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.transition(LifecycleState::Running);
        tokio::pin!(server);

        loop {
            tokio::select! {
                result = &mut server => {
                    self.transition(LifecycleState::StopPending);
                    self.transition(LifecycleState::Stopped);
                    return result;
                }
                control = controls.recv() => match control {
                    Some(ServiceControl::Stop) | Some(ServiceControl::Shutdown) => {
                        if self.transition(LifecycleState::StopPending) {
                            tracing::info!("stop requested, draining");
                            self.shutdown.trigger();
                        }
                    }
                    Some(ServiceControl::Interrogate(reply)) => {
                        let _ = reply.send(self.state);
                    }
                    // Control source gone; nothing can request a stop any
                    // more, so initiate one instead of waiting forever.
                    None => {
                        if self.transition(LifecycleState::StopPending) {
                            tracing::warn!("control channel closed, draining");
                            self.shutdown.trigger();
                        }
                        let result = server.await;
                        self.transition(LifecycleState::Stopped);
                        return result;
                    }
                },
            }
        }
    }
}
