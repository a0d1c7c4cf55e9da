// Firmware build/flash tool adapter
//
// Wraps the external tool (`esphome` by default) that compiles a device
// configuration and uploads it over the air. The command is a list so a
// wrapper such as `["uv", "run", "esphome"]` works unchanged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::Error;
use crate::process::{self, ProcessOutput};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// What to ask the build tool to do with a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareAction {
    Compile,
    Upload,
}

impl FirmwareAction {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Upload => "upload",
        }
    }
}

/// Invokes the external firmware tool with a bounded wait.
#[derive(Debug, Clone)]
pub struct FirmwareTool {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
}

impl FirmwareTool {
    /// `command` is the program followed by any fixed leading arguments.
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>) -> Result<Self, Error> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(Error::InvalidCommand {
                reason: "firmware command is empty".into(),
            });
        }
        Ok(Self {
            command,
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The executable name, for prerequisite checks.
    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run `action` against `config` (relative to the working directory).
    ///
    /// Non-zero exit is returned as output, not as `Err`; the caller decides
    /// whether it means "offline", "auth failure" or something else.
    pub async fn run(&self, action: FirmwareAction, config: &Path) -> Result<ProcessOutput, Error> {
        let (program, fixed) = self
            .command
            .split_first()
            .ok_or_else(|| Error::InvalidCommand {
                reason: "firmware command is empty".into(),
            })?;

        let mut args: Vec<String> = fixed.to_vec();
        args.push(action.as_arg().into());
        args.push(config.to_string_lossy().into_owned());

        info!(action = action.as_arg(), config = %config.display(), "running firmware tool");
        process::run(program, &args, Some(&self.workdir), self.timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        assert!(FirmwareTool::new(vec![], ".").is_err());
        assert!(FirmwareTool::new(vec!["  ".into()], ".").is_err());
    }

    #[test]
    fn program_is_first_word() {
        let tool = FirmwareTool::new(vec!["uv".into(), "run".into(), "esphome".into()], ".").unwrap();
        assert_eq!(tool.program(), "uv");
    }

    #[test]
    fn action_args() {
        assert_eq!(FirmwareAction::Compile.as_arg(), "compile");
        assert_eq!(FirmwareAction::Upload.as_arg(), "upload");
    }
}
