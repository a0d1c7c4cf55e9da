//! `fleetkey generate`: print one fresh credential.

use fleetkey_core::CredentialKind;

use crate::cli::{GenerateArgs, GlobalOpts};
use crate::output;

pub fn handle(args: &GenerateArgs, global: &GlobalOpts) {
    let kind = CredentialKind::from(args.kind);
    output::print_output(&kind.generate(), global.quiet);
}
