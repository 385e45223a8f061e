//! Sensor listing.

use std::sync::Arc;

use tabled::Tabled;

use edd_core::{ProductConfig, RemoteProductProxy, Sensor, SensorRegistry, SensorType};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl SensorRow {
    fn new(s: &Sensor) -> Self {
        let kind = match &s.sensor_type {
            SensorType::String => "string".into(),
            SensorType::Discrete(values) => format!("discrete({})", values.join(",")),
        };
        Self {
            name: s.name.clone(),
            kind,
            value: s.value.clone(),
            status: s.status.to_string(),
            description: s.description.clone(),
        }
    }
}

/// Install the product's sensors in a local registry and list them.
pub fn handle(product: ProductConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = Arc::new(SensorRegistry::new());
    let proxy = RemoteProductProxy::connect(registry.clone(), product);
    proxy.setup_sensors()?;

    let sensors = registry.sensors();
    let out = output::render_list(global.output, &sensors, SensorRow::new, |s| {
        format!("{} {}", s.name, s.value)
    })?;
    output::print_output(&out);
    Ok(())
}
