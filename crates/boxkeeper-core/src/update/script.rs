//! Shell script and dependency-install execution.
//!
//! Every child runs under a deadline and is killed when it passes, so a hung
//! script cannot hold the installation forever.

use super::error::UpdateError;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Captured output of a successful script or command.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `script` with `bash` in `cwd`, marking it executable first.
///
/// # Errors
/// `SCRIPT_FAILED` if the script cannot be spawned, exits non-zero or runs
/// longer than `timeout`.
pub async fn run_script(
    script: &Path,
    cwd: &Path,
    timeout: Duration,
) -> Result<ScriptOutput, UpdateError> {
    let name = script
        .file_name()
        .map_or_else(|| script.display().to_string(), |n| n.to_string_lossy().into_owned());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755)).map_err(
            |e| UpdateError::script_failed(format!("Failed to make {name} executable: {e}")),
        )?;
    }

    let mut command = Command::new("bash");
    command.arg(script).current_dir(cwd);
    run(command, &name, timeout).await
}

/// Run `program args..` in `cwd` (used for `npm install`).
///
/// # Errors
/// `SCRIPT_FAILED` if the command cannot be spawned, exits non-zero or runs
/// longer than `timeout`.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<ScriptOutput, UpdateError> {
    let label = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let mut command = Command::new(program);
    command.args(args).current_dir(cwd);
    run(command, &label, timeout).await
}

async fn run(
    mut command: Command,
    label: &str,
    timeout: Duration,
) -> Result<ScriptOutput, UpdateError> {
    // Dropping the output future on timeout kills the child.
    let child = command.stdin(Stdio::null()).kill_on_drop(true).output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| {
            UpdateError::script_failed(format!(
                "{label} timed out after {}s",
                timeout.as_secs_f32()
            ))
        })?
        .map_err(|e| UpdateError::script_failed(format!("Failed to run {label}: {e}")))?;

    finish(label, output)
}

fn finish(label: &str, output: Output) -> Result<ScriptOutput, UpdateError> {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        return Ok(ScriptOutput { stdout, stderr });
    }

    let status = output
        .status
        .code()
        .map_or_else(|| "was terminated by a signal".to_string(), |c| format!("exited with code {c}"));
    let mut message = format!("{label} {status}");
    if !stderr.is_empty() {
        message.push_str(": ");
        message.push_str(&stderr);
    }
    Err(UpdateError::script_failed(message))
}
