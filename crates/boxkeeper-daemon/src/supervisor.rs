//! Process supervisor integration.

use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Default deadline for `<command> restart <service>`.
pub const RESTART_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Restarts the managed service after an install.
pub trait Supervisor: Send + Sync + std::fmt::Debug {
    /// Ask the supervisor to restart `service`.
    fn restart(&self, service: &str) -> io::Result<()>;

    /// Terminate this process after `delay` so an external supervisor
    /// brings it back. Used when `restart` fails.
    fn schedule_exit(&self, delay: Duration);
}

/// `pm2`-style supervisor invoked as `<command> restart <service>`.
///
/// The command is killed and reported as failed once it runs past its
/// timeout.
#[derive(Debug, Clone)]
pub struct Pm2Supervisor {
    command: String,
    timeout: Duration,
}

impl Pm2Supervisor {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: RESTART_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Supervisor for Pm2Supervisor {
    fn restart(&self, service: &str) -> io::Result<()> {
        let mut child = Command::new(&self.command)
            .args(["restart", service])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        while child.try_wait()?.is_none() {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "{} restart {service} timed out after {}s",
                        self.command,
                        self.timeout.as_secs_f32()
                    ),
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let output = child.wait_with_output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::other(format!(
            "{} restart {service} failed ({}): {}",
            self.command,
            output.status,
            stderr.trim()
        )))
    }

    fn schedule_exit(&self, delay: Duration) {
        tracing::warn!(delay_ms = delay.as_millis() as u64, "scheduling process exit");
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            std::process::exit(0);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_supervisor_binary() {
        let supervisor = Pm2Supervisor::new("boxkeeper-no-such-supervisor");
        assert!(supervisor.restart("local-app").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_restart_exit_status() {
        assert!(Pm2Supervisor::new("true").restart("local-app").is_ok());
        let err = Pm2Supervisor::new("false").restart("local-app").unwrap_err();
        assert!(err.to_string().contains("false restart local-app failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_restart_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let command = dir.path().join("pm2");
        std::fs::write(&command, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&command, std::fs::Permissions::from_mode(0o755)).unwrap();

        let supervisor = Pm2Supervisor::new(command.to_string_lossy())
            .with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = supervisor.restart("local-app").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
