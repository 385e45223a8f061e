//! Configured product listing.

use serde::Serialize;
use tabled::Tabled;

use edd_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ProductView {
    id: String,
    address: String,
    sync_timeout: Option<u64>,
    configure_timeout: u64,
}

#[derive(Tabled)]
struct ProductRow {
    #[tabled(rename = "Product")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Sync timeout")]
    sync_timeout: String,
    #[tabled(rename = "Configure timeout")]
    configure_timeout: String,
}

impl ProductRow {
    fn new(p: &ProductView) -> Self {
        Self {
            id: p.id.clone(),
            address: p.address.clone(),
            sync_timeout: p
                .sync_timeout
                .map_or_else(|| "none".into(), |s| format!("{s}s")),
            configure_timeout: format!("{}s", p.configure_timeout),
        }
    }
}

pub fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let products = cfg
        .products
        .keys()
        .map(|id| {
            let product = cfg.product_config(id)?;
            Ok(ProductView {
                id: product.product_id,
                address: product.address.to_string(),
                sync_timeout: product.sync_timeout.map(|d| d.as_secs()),
                configure_timeout: product.configure_timeout.as_secs(),
            })
        })
        .collect::<Result<Vec<_>, CliError>>()?;

    let out = output::render_list(global.output, &products, ProductRow::new, |p| {
        p.id.clone()
    })?;
    output::print_output(&out);
    Ok(())
}
