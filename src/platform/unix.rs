//! Power actions on Unix hosts via systemd/loginctl.

use std::process::Command;

use super::{ExecutorError, PowerExecutor};

pub struct UnixExecutor;

impl PowerExecutor for UnixExecutor {
    fn execute(&self, action: &str) -> Result<(), ExecutorError> {
        match action {
            "shutdown" => run("shutdown", "systemctl", &["poweroff"]),
            "restart" => run("restart", "systemctl", &["reboot"]),
            "hibernate" => run("hibernate", "systemctl", &["hibernate"]),
            "sleep" => run("sleep", "systemctl", &["suspend"]),
            "lock" => run("lock", "loginctl", &["lock-sessions"]),
            "logoff" => run("logoff", "loginctl", &["terminate-user", ""]),
            "screen-off" => run("screen-off", "xset", &["dpms", "force", "off"]),
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
