//! Service supervisor provisioning (`install` / `remove` subcommands).

#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use std::process::Command;

pub const SERVICE_NAME: &str = "powerd";

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("service management is only supported on Unix hosts")]
    Unsupported,

    #[error("failed to resolve executable path: {0}")]
    ExePath(std::io::Error),

    #[error("failed to write {path}: {source}")]
    WriteUnit {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run systemctl {args}: {source}")]
    Systemctl {
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("systemctl {args} exited with {status}")]
    SystemctlFailed {
        args: String,
        status: std::process::ExitStatus,
    },
}

/// Install the agent as a supervised service, storing the given flags as
/// the service arguments, and start it.
#[cfg(unix)]
pub fn install_service(args: &[String]) -> Result<(), InstallError> {
    let exe = std::env::current_exe().map_err(InstallError::ExePath)?;
    let exec_start = std::iter::once(exe.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    let unit = format!(
        "[Unit]\n\
         Description=Remote power management over HTTPS\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=notify\n\
         ExecStart={exec_start}\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n"
    );

    let path = unit_path();
    std::fs::write(&path, unit).map_err(|source| InstallError::WriteUnit {
        path: path.display().to_string(),
        source,
    })?;

    systemctl(&["daemon-reload"])?;
    systemctl(&["enable", "--now", SERVICE_NAME])?;
    println!("service {SERVICE_NAME:?} installed and started");
    Ok(())
}

/// Stop and remove the supervised service.
#[cfg(unix)]
pub fn remove_service() -> Result<(), InstallError> {
    systemctl(&["disable", "--now", SERVICE_NAME])?;
    let path = unit_path();
    if path.exists() {
        std::fs::remove_file(&path).map_err(|source| InstallError::WriteUnit {
            path: path.display().to_string(),
            source,
        })?;
    }
    systemctl(&["daemon-reload"])?;
    println!("service {SERVICE_NAME:?} removed");
    Ok(())
}

#[cfg(unix)]
fn unit_path() -> std::path::PathBuf {
    Path::new("/etc/systemd/system").join(format!("{SERVICE_NAME}.service"))
}

#[cfg(unix)]
fn systemctl(args: &[&str]) -> Result<(), InstallError> {
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .map_err(|source| InstallError::Systemctl {
            args: args.join(" "),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(InstallError::SystemctlFailed {
            args: args.join(" "),
            status,
        })
    }
}

#[cfg(not(unix))]
pub fn install_service(_args: &[String]) -> Result<(), InstallError> {
    Err(InstallError::Unsupported)
}

#[cfg(not(unix))]
pub fn remove_service() -> Result<(), InstallError> {
    Err(InstallError::Unsupported)
}
