// ── Adapter error types ──
//
// Raised by the process, vault, hook and probe adapters. `fleetkey-core`
// translates these into domain errors; the CLI never matches on them
// directly.

use thiserror::Error;

/// Unified error type for the adapter crate.
#[derive(Debug, Error)]
pub enum Error {
    // ── Process errors ───────────────────────────────────────────────
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    #[error("`{program}` exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("invalid tool command: {reason}")]
    InvalidCommand { reason: String },

    // ── Vault errors ─────────────────────────────────────────────────
    #[error("vault error: {message}")]
    Vault { message: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    // ── IO ───────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means "the call ran out of time" rather than
    /// "the call ran and failed".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
