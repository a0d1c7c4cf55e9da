//! Command dispatch: bridges CLI args -> core operations -> output.

pub mod backup;
pub mod config_cmd;
pub mod deploy;
pub mod devices;
pub mod generate;
pub mod rotate;
pub mod scan;
pub mod track;
pub mod util;
pub mod validate;

use crate::cli::{Command, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;

/// Dispatch a working-tree command to its handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Rotate(args) => rotate::handle(args, ctx, global).await,
        Command::Backup(args) => backup::handle(args, ctx, global),
        Command::ValidateSecrets(args) => validate::handle(&args, ctx).await,
        Command::TrackRotation(args) => track::handle(args, ctx, global).await,
        Command::Deploy(args) => deploy::handle(args, ctx, global).await,
        Command::Devices => devices::handle(ctx, global),
        Command::Scan(args) => scan::handle(&args, ctx, global),
        // Handled before a context is loaded
        Command::Config(_) | Command::Generate(_) | Command::Completions(_) => unreachable!(),
    }
}
