//! Power actions on Windows hosts.

use std::process::Command;

use super::{ExecutorError, PowerExecutor};

pub struct WindowsExecutor;

impl PowerExecutor for WindowsExecutor {
    fn execute(&self, action: &str) -> Result<(), ExecutorError> {
        match action {
            "shutdown" => run("shutdown", "shutdown", &["/s", "/t", "0"]),
            "restart" => run("restart", "shutdown", &["/r", "/t", "0"]),
            "hibernate" => run("hibernate", "shutdown", &["/h"]),
            "sleep" => run(
                "sleep",
                "rundll32.exe",
                &["powrprof.dll,SetSuspendState", "0,1,0"],
            ),
            "lock" => run("lock", "rundll32.exe", &["user32.dll,LockWorkStation"]),
            "logoff" => run("logoff", "shutdown", &["/l"]),
            "screen-off" => {
                screen_off();
                Ok(())
            }
            other => Err(ExecutorError::UnknownAction(other.to_string())),
        }
    }
}

fn run(action: &'static str, program: &str, args: &[&str]) -> Result<(), ExecutorError> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| ExecutorError::Spawn { action, source })?;

    if status.success() {
        Ok(())
    } else {
        Err(ExecutorError::CommandFailed { action, status })
    }
}

/// Broadcast SC_MONITORPOWER to turn displays off.
fn screen_off() {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        SendMessageW, HWND_BROADCAST, SC_MONITORPOWER, WM_SYSCOMMAND,
    };

    // 2 = monitor off.
    unsafe {
        SendMessageW(HWND_BROADCAST, WM_SYSCOMMAND, SC_MONITORPOWER as usize, 2);
    }
}
