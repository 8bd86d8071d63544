//! Running the external extraction tool.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, trace};

use super::error::ExtractError;

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args`, bounded by `timeout`.
///
/// The child is spawned with `kill_on_drop`, so a timeout or a cancelled
/// caller terminates it instead of leaving it running.
///
/// # Errors
///
/// - [`ExtractError::Tool`] when the program cannot be started
/// - [`ExtractError::Timeout`] when it runs longer than `timeout`
pub async fn run_tool<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
    backend: &str,
) -> Result<ToolOutput, ExtractError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    trace!(program = %program.display(), "spawning extraction tool");

    let child = command.spawn().map_err(|e| ExtractError::Tool {
        tool: program.display().to_string(),
        detail: e.to_string(),
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ExtractError::Tool {
            tool: program.display().to_string(),
            detail: e.to_string(),
        })?,
        Err(_) => {
            debug!(backend, timeout_secs = timeout.as_secs(), "extraction tool timed out");
            return Err(ExtractError::timeout(backend, timeout));
        }
    };

    Ok(ToolOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_tool_captures_output() {
        let out = run_tool(
            Path::new("sh"),
            ["-c", "echo out; echo err >&2; exit 3"],
            Duration::from_secs(10),
            "test",
        )
        .await
        .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary_is_tool_error() {
        let err = run_tool(
            Path::new("/nonexistent/definitely-not-yt-dlp"),
            ["--version"],
            Duration::from_secs(5),
            "test",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::Tool { .. }));
    }

    #[tokio::test]
    async fn test_run_tool_timeout() {
        let err = run_tool(
            Path::new("sh"),
            ["-c", "sleep 5"],
            Duration::from_millis(100),
            "test",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::Timeout { .. }));
    }
}
