//! `fleetkey devices`: discovered devices and their variants.

use std::path::Path;

use tabled::Tabled;

use fleetkey_core::{DeviceConfig, Reporter};

use crate::cli::GlobalOpts;
use crate::config::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    name: String,
    #[tabled(rename = "Variants")]
    variants: String,
    #[tabled(rename = "Minimal")]
    minimal: String,
    #[tabled(rename = "Full")]
    full: String,
}

fn display(path: Option<&Path>) -> String {
    path.map_or_else(|| "-".into(), |p| p.display().to_string())
}

impl From<&DeviceConfig> for DeviceRow {
    fn from(d: &DeviceConfig) -> Self {
        Self {
            name: d.name.clone(),
            variants: d.variants(),
            minimal: display(d.minimal_config()),
            full: display(d.full_config()),
        }
    }
}

pub fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let devices: Vec<DeviceConfig> = registry.iter().cloned().collect();
    if devices.is_empty() {
        ctx.reporter
            .warning(&format!("No device configurations found in {}", ctx.root().display()));
    }
    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
