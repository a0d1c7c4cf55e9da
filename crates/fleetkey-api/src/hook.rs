// Credential-detection hook adapter
//
// The hook is any executable that takes file paths as arguments and exits
// non-zero when it finds a known-bad credential. It is normally the
// repository's pre-commit script.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Error;
use crate::process;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs the credential-detection hook against files.
#[async_trait]
pub trait CredentialHook: Send + Sync {
    /// Whether the hook executable is present.
    fn exists(&self) -> bool;

    /// `Ok(true)` when the hook flagged `file` (non-zero exit).
    async fn flags(&self, file: &Path) -> Result<bool, Error>;
}

/// Executes a hook script found on disk.
#[derive(Debug, Clone)]
pub struct HookRunner {
    path: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(path: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialHook for HookRunner {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    async fn flags(&self, file: &Path) -> Result<bool, Error> {
        let program = self.path.to_string_lossy();
        let out = process::run(&program, [file], Some(&self.workdir), self.timeout).await?;
        debug!(hook = %self.path.display(), file = %file.display(), status = ?out.status, "hook finished");
        Ok(!out.success())
    }
}
