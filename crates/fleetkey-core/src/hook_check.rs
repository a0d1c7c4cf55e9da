// Regression check for the credential-detection hook.
//
// Writes one fixture per credential kind holding a known-exposed value and
// requires the hook to flag every one of them.

use std::fs;
use std::path::Path;

use fleetkey_api::CredentialHook;
use tracing::debug;

use crate::credential::{Blocklist, CredentialKind};
use crate::error::CoreError;

fn fixture_name(kind: CredentialKind) -> &'static str {
    match kind {
        CredentialKind::ApiKey => "test_old_api.yaml",
        CredentialKind::OtaPassword => "test_old_ota.yaml",
        CredentialKind::FallbackPassword => "test_old_fallback.yaml",
    }
}

/// Run the hook against synthetic leaked-credential fixtures.
///
/// Fixtures live in a temporary directory under `root` and are removed
/// afterwards. A kind with no blocklisted value, or a hook invocation
/// error, counts as missed.
pub async fn self_test_hook(
    hook: &dyn CredentialHook,
    root: &Path,
    blocklist: &Blocklist,
) -> Result<(), CoreError> {
    let dir = tempfile::Builder::new()
        .prefix(".fleetkey-hook-")
        .tempdir_in(root)
        .map_err(CoreError::io(root))?;

    let mut missed = Vec::new();
    for kind in CredentialKind::ALL {
        let name = fixture_name(kind);
        let Some(value) = blocklist.sample(kind) else {
            missed.push(format!("{name} (no exposed {} known)", kind.label()));
            continue;
        };
        let path = dir.path().join(name);
        fs::write(&path, format!("{}: \"{value}\"\n", kind.field_name()))
            .map_err(CoreError::io(&path))?;

        match hook.flags(&path).await {
            Ok(true) => debug!(fixture = name, "hook flagged fixture"),
            Ok(false) => missed.push(name.to_owned()),
            Err(e) => missed.push(format!("{name} ({e})")),
        }
    }

    if missed.is_empty() {
        Ok(())
    } else {
        Err(CoreError::HookSelfTestFailed { missed })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    /// Flags a file when its contents match any blocklisted value,
    /// optionally blind to one credential kind or absent altogether.
    pub(crate) struct ScriptedHook {
        pub(crate) blocklist: Blocklist,
        pub(crate) blind_to: Option<CredentialKind>,
        pub(crate) missing: bool,
        pub(crate) seen: Mutex<Vec<PathBuf>>,
    }

    impl ScriptedHook {
        pub(crate) fn new() -> Self {
            Self {
                blocklist: Blocklist::default(),
                blind_to: None,
                missing: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CredentialHook for ScriptedHook {
        fn exists(&self) -> bool {
            !self.missing
        }

        async fn flags(&self, file: &Path) -> Result<bool, fleetkey_api::Error> {
            self.seen.lock().unwrap().push(file.to_path_buf());
            let text = fs::read_to_string(file)?;
            Ok(self
                .blocklist
                .iter()
                .filter(|(kind, _)| Some(*kind) != self.blind_to)
                .any(|(_, value)| text.contains(value)))
        }
    }

    #[tokio::test]
    async fn all_fixtures_flagged() {
        let dir = TempDir::new().unwrap();
        let hook = ScriptedHook::new();

        self_test_hook(&hook, dir.path(), &Blocklist::default())
            .await
            .unwrap();

        let seen = hook.seen.lock().unwrap();
        let names: Vec<_> = seen
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["test_old_api.yaml", "test_old_ota.yaml", "test_old_fallback.yaml"]
        );
        // Fixtures are cleaned up.
        assert!(seen.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn missed_kind_is_reported() {
        let dir = TempDir::new().unwrap();
        let hook = ScriptedHook {
            blind_to: Some(CredentialKind::OtaPassword),
            ..ScriptedHook::new()
        };

        let err = self_test_hook(&hook, dir.path(), &Blocklist::default())
            .await
            .unwrap_err();

        assert!(
            matches!(err, CoreError::HookSelfTestFailed { ref missed } if missed == &["test_old_ota.yaml"])
        );
    }
}
