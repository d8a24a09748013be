//! OS signal handling.
//!
//! Interrupt and terminate signals are translated into typed control
//! messages for the lifecycle control loop; nothing else in the process
//! listens for signals directly.

use tokio::sync::mpsc;

use crate::lifecycle::service::ServiceControl;

/// Spawn a task translating OS stop signals into control messages.
///
/// The task ends once the control channel closes.
pub fn spawn_signal_source(controls: mpsc::Sender<ServiceControl>) {
    tokio::spawn(async move {
        loop {
            wait_for_stop_signal().await;
            if controls.send(ServiceControl::Stop).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
