// External program execution
//
// Every external call in a rotation (vault CLI, build tool, hook) funnels
// through `run`. The child is spawned with piped output and `kill_on_drop`,
// so an expired timeout -- or a cancelled rotation -- never leaves a
// flashing process behind.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::Error;

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stderr followed by stdout, the order tools usually print diagnostics in.
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stderr.len() + self.stdout.len());
        text.push_str(&self.stderr);
        text.push_str(&self.stdout);
        text
    }
}

/// Run `program` with `args`, waiting at most `timeout`.
///
/// A non-zero exit is *not* an error here -- callers classify the output.
/// Only failure to spawn, IO failure while collecting output, and timeout
/// are reported as `Err`.
pub async fn run<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<ProcessOutput, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(program, timeout_secs = timeout.as_secs(), "spawning external program");
    let child = cmd.spawn().map_err(|source| Error::Spawn {
        program: program.to_owned(),
        source,
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::Timeout {
                program: program.to_owned(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let output = ProcessOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    trace!(program, status = ?output.status, "external program finished");
    Ok(output)
}

/// Whether `name` resolves to an executable on `PATH` (or is a path to one).
pub fn tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}
