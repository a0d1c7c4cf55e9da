//! Config subcommand handlers.

use fleetkey_config::{load_config, project_config_path, write_default};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{consulted_files, working_tree};
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let root = working_tree(&global.dir)?;
    let explicit = global.config.as_deref();

    match args.command {
        ConfigCommand::Show => {
            let cfg = load_config(&root, explicit)?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => cfg.to_toml()?,
                _ => output::render_single(&global.output, &cfg, |_| String::new(), |_| {
                    String::new()
                })?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            let lines: Vec<String> = consulted_files(&root, explicit)
                .into_iter()
                .map(|(label, path)| {
                    let state = if path.is_file() { "" } else { " (not found)" };
                    format!("{label}: {}{state}", path.display())
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = project_config_path(&root, explicit);
            if force
                && path.exists()
                && !util::confirm(
                    &format!("Overwrite {}?", path.display()),
                    "config init --force",
                    global.yes,
                )?
            {
                return Ok(());
            }
            write_default(&path, force)?;
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}
