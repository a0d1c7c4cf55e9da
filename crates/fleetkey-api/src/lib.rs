//! Adapters for the external collaborators a credential rotation drives.
//!
//! Nothing in here knows what a credential *is*. This crate only knows how
//! to talk to the outside world, always with a bounded wait:
//!
//! - **[`process`]**: spawn a program, capture its output, kill it when the
//!   timeout expires.
//! - **[`SecretVault`]**: the narrow get/set/reachability interface to a
//!   secret store, with [`OnePasswordCli`], [`KeyringVault`] and the
//!   in-process [`MemoryVault`] backends.
//! - **[`FirmwareTool`]**: compile/upload a device configuration with the
//!   external build/flash tool.
//! - **[`CredentialHook`]**: run the credential-detection hook on a file.
//! - **[`LivenessProbe`]**: a cheap "is the device answering" check.

pub mod error;
pub mod firmware;
pub mod hook;
pub mod probe;
pub mod process;
pub mod vault;

pub use error::Error;
pub use firmware::{FirmwareAction, FirmwareTool};
pub use hook::{CredentialHook, HookRunner};
pub use probe::{LivenessProbe, TcpProbe};
pub use process::{ProcessOutput, tool_available};
pub use vault::{KeyringVault, MemoryVault, OnePasswordCli, SecretVault};
