//! `edd config`: inspect the effective configuration.

use std::path::Path;

use edd_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, cfg: &Config, path: &Path) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => output::print_output(&edd_config::render_config(cfg)?),
        ConfigCommand::Path => output::print_output(&path.display().to_string()),
    }
    Ok(())
}
