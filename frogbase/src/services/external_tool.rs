//! Subprocess runner for external command-line tools (yt-dlp, whisper)

use std::ffi::OsStr;
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// External tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Binary not found in PATH
    #[error("{0} not found in PATH")]
    BinaryNotFound(String),

    /// Failed to spawn or wait on the process
    #[error("Failed to execute {0}: {1}")]
    ExecutionError(String, String),

    /// Process exited unsuccessfully
    #[error("{binary} exited with code {code:?}: {stderr}")]
    Failed {
        binary: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Process did not finish in time and was killed
    #[error("{0} timed out after {1:?}")]
    TimedOut(String, Duration),
}

/// Run `binary args...` to completion, killing it on timeout
pub async fn run_tool<I, S>(binary: &str, args: I, timeout: Duration) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(binary);
    command.args(args).kill_on_drop(true);

    tracing::debug!(binary, "Running external tool");

    let child = command.output();
    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => return Err(ToolError::TimedOut(binary.to_string(), timeout)),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::BinaryNotFound(binary.to_string()))
        }
        Ok(Err(e)) => return Err(ToolError::ExecutionError(binary.to_string(), e.to_string())),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed {
            binary: binary.to_string(),
            code: output.status.code(),
            stderr: last_lines(&stderr, 5),
        });
    }

    Ok(output)
}

/// Check whether `binary --version` runs
pub async fn is_available(binary: &str) -> bool {
    run_tool(binary, ["--version"], Duration::from_secs(10))
        .await
        .is_ok()
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
