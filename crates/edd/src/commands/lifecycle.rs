//! Lifecycle commands: configure, deconfigure, capture-start, capture-stop.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use edd_core::{ProductConfig, RemoteProductProxy, Reply, SensorRegistry};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub enum Operation {
    Configure(serde_json::Value),
    Deconfigure,
    CaptureStart,
    CaptureStop,
}

impl Operation {
    fn request(&self) -> &'static str {
        match self {
            Self::Configure(_) => "configure",
            Self::Deconfigure => "deconfigure",
            Self::CaptureStart => "capture_start",
            Self::CaptureStop => "capture_stop",
        }
    }
}

/// Read the configuration JSON from `path`, or stdin for `-`.
pub fn read_payload(path: &Path) -> Result<serde_json::Value, CliError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

pub async fn handle(
    op: Operation,
    product: ProductConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let registry = Arc::new(SensorRegistry::new());
    let proxy = RemoteProductProxy::connect(registry, product);
    proxy.setup_sensors()?;

    let reply = match &op {
        Operation::Configure(payload) => proxy.configure(payload).await?,
        Operation::Deconfigure => proxy.deconfigure().await?,
        Operation::CaptureStart => proxy.capture_start().await?,
        Operation::CaptureStop => proxy.capture_stop().await?,
    };

    let view = ReplyView::new(proxy.product_id(), op.request(), &reply);
    let out = output::render_single(global.output, &view, ReplyView::detail, |v| {
        v.status.clone()
    })?;
    output::print_output(&out);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ReplyView {
    product: String,
    request: String,
    status: String,
    values: Vec<String>,
    informs: Vec<String>,
}

impl ReplyView {
    fn new(product: &str, request: &str, reply: &Reply) -> Self {
        Self {
            product: product.into(),
            request: request.into(),
            status: reply.status().into(),
            values: reply.values().to_vec(),
            informs: reply.informs.iter().map(ToString::to_string).collect(),
        }
    }

    fn detail(&self) -> String {
        let mut lines = vec![
            format!("Product:  {}", self.product),
            format!("Request:  {}", self.request),
            format!("Status:   {}", self.status),
        ];
        if !self.values.is_empty() {
            lines.push(format!("Values:   {}", self.values.join(" ")));
        }
        lines.extend(self.informs.iter().map(|i| format!("Inform:   {i}")));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use edd_core::Message;

    use super::*;

    #[test]
    fn payload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("{e}"));
        file.write_all(br#"{"band":"L"}"#)
            .unwrap_or_else(|e| panic!("{e}"));

        let payload = read_payload(file.path()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(payload, serde_json::json!({"band": "L"}));
    }

    #[test]
    fn malformed_payload_is_a_usage_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("{e}"));
        file.write_all(b"{band").unwrap_or_else(|e| panic!("{e}"));

        let err = read_payload(file.path()).err();
        assert!(matches!(err, Some(CliError::Json(_))));
    }

    #[test]
    fn reply_view_lists_values_and_informs() {
        let mut reply = Reply::ok("capture-start", ["started"]);
        reply
            .informs
            .push(Message::inform("capture-start", ["stream", "1"]));

        let view = ReplyView::new("P1", "capture_start", &reply);
        assert_eq!(view.status, "ok");
        assert_eq!(view.values, vec!["started".to_string()]);

        let detail = view.detail();
        assert!(detail.contains("Product:  P1"));
        assert!(detail.contains("Inform:   #capture-start stream 1"));
    }
}
