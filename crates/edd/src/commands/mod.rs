//! Command dispatch: bridges CLI args -> product proxy -> output formatting.

pub mod config_cmd;
pub mod lifecycle;
pub mod products;
pub mod sensors;

use std::path::PathBuf;
use std::time::Duration;

use edd_config::{Config, Port, ProductEntry};
use edd_core::ProductConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a product-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    product: ProductConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Configure(args) => {
            let payload = lifecycle::read_payload(&args.file)?;
            lifecycle::handle(lifecycle::Operation::Configure(payload), product, global).await
        }
        Command::Deconfigure => {
            lifecycle::handle(lifecycle::Operation::Deconfigure, product, global).await
        }
        Command::CaptureStart => {
            lifecycle::handle(lifecycle::Operation::CaptureStart, product, global).await
        }
        Command::CaptureStop => {
            lifecycle::handle(lifecycle::Operation::CaptureStop, product, global).await
        }
        Command::Sensors => sensors::handle(product, global),
        // Local commands are handled before dispatch
        Command::Products | Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

/// Load the config from `--config` or the default path.
pub fn load_config(global: &GlobalOpts) -> Result<(Config, PathBuf), CliError> {
    let path = global.config.clone().unwrap_or_else(edd_config::config_path);
    let cfg = edd_config::load_config_from(&path)?;
    Ok((cfg, path))
}

/// Build the `ProductConfig` for `--product`, applying `--host`, `--port`
/// and `--sync-timeout` over the config file entry.
pub fn resolve_product(global: &GlobalOpts, cfg: &Config) -> Result<ProductConfig, CliError> {
    let id = global.product.as_deref().ok_or(CliError::NoProduct)?;

    let entry = match (cfg.entry(id), &global.host) {
        (Ok(entry), _) => {
            let mut entry = entry.clone();
            if let Some(host) = &global.host {
                entry.host.clone_from(host);
            }
            if let Some(port) = &global.port {
                entry.port = Port::Text(port.clone());
            }
            entry
        }
        (Err(_), Some(host)) => {
            let port = global.port.clone().ok_or_else(|| CliError::Validation {
                field: "port".into(),
                reason: "--port is required with --host".into(),
            })?;
            ProductEntry {
                host: host.clone(),
                port: Port::Text(port),
                request_timeout: None,
                configure_timeout: None,
                sync_timeout: None,
            }
        }
        (Err(err), None) => return Err(err.into()),
    };

    let mut product = cfg.defaults.product_config(id, &entry)?;
    if let Some(secs) = global.sync_timeout {
        product.sync_timeout = (secs > 0).then_some(Duration::from_secs(secs));
    }
    Ok(product)
}
