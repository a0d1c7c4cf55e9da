// 1Password CLI backend
//
// Thin wrapper around `op item get` / `op item edit`. Field reads use
// `--reveal` so concealed fields come back in clear text; a non-zero exit
// from `op item get` is treated as "field absent", matching how `op`
// reports unknown items and fields.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::SecretVault;
use crate::error::Error;
use crate::process::{self, ProcessOutput};

const DEFAULT_PROGRAM: &str = "op";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Vault backed by the 1Password command-line tool.
#[derive(Debug, Clone)]
pub struct OnePasswordCli {
    program: String,
    account: Option<String>,
    timeout: Duration,
}

impl OnePasswordCli {
    /// Create an adapter for `account` (the `--account` shorthand or URL).
    pub fn new(account: Option<String>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
            account,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the `op` executable (path or name on `PATH`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    async fn op(&self, mut args: Vec<String>) -> Result<ProcessOutput, Error> {
        if let Some(ref account) = self.account {
            args.push(format!("--account={account}"));
        }
        process::run(&self.program, &args, None, self.timeout).await
    }
}

#[async_trait]
impl SecretVault for OnePasswordCli {
    fn backend_name(&self) -> &'static str {
        "1password"
    }

    async fn check_available(&self) -> bool {
        match self.op(vec!["account".into(), "list".into()]).await {
            Ok(out) if out.success() => match self.account {
                Some(ref account) => out.stdout.contains(account.as_str()),
                None => true,
            },
            Ok(out) => {
                debug!(stderr = %out.stderr.trim(), "op account list failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "op not usable");
                false
            }
        }
    }

    async fn get_field(
        &self,
        vault: &str,
        item: &str,
        field: &str,
    ) -> Result<Option<String>, Error> {
        let out = self
            .op(vec![
                "item".into(),
                "get".into(),
                item.into(),
                format!("--vault={vault}"),
                format!("--fields={field}"),
                "--reveal".into(),
            ])
            .await?;

        if !out.success() {
            debug!(vault, item, field, stderr = %out.stderr.trim(), "field not readable");
            return Ok(None);
        }

        let value = out.stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_owned()))
    }

    async fn set_field(
        &self,
        vault: &str,
        item: &str,
        field: &str,
        value: &str,
    ) -> Result<(), Error> {
        let out = self
            .op(vec![
                "item".into(),
                "edit".into(),
                item.into(),
                format!("--vault={vault}"),
                format!("{field}={value}"),
            ])
            .await?;

        if out.success() {
            return Ok(());
        }

        warn!(vault, item, field, "op item edit failed");
        Err(Error::CommandFailed {
            program: self.program.clone(),
            status: out.status.unwrap_or(-1),
            stderr: out.stderr.trim().to_owned(),
        })
    }
}
