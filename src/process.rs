use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::Result;
use crate::subagent::bridge::run_bounded;

/// Headroom for the runtime bridge past the child's own limit.
const BRIDGE_GRACE: Duration = Duration::from_secs(5);

/// Captured result of a child process that finished in time.
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion, killing it once `limit` elapses.
///
/// Returns `Ok(None)` on timeout.
pub async fn run_with_timeout(mut command: Command, limit: Duration) -> Result<Option<Finished>> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Dropping the wait future on timeout drops the child, which kills it.
    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(Some(Finished {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }))
        }
        Err(_) => Ok(None),
    }
}

/// [`run_with_timeout`] for synchronous callers such as tools.
pub fn run_blocking(command: Command, limit: Duration) -> Result<Option<Finished>> {
    run_bounded(limit + BRIDGE_GRACE, move || run_with_timeout(command, limit))?
}
