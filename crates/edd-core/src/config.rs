// ── Runtime product configuration ──
//
// These types describe *which* product server to talk to and how long to
// wait on it. They never touch disk; edd-config or the caller builds a
// `ProductConfig` and hands it to the proxy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use edd_katcp::TransportConfig;

use crate::error::ProductError;

/// Timeout for the `configure` request; pipelines can take minutes to set up.
pub const CONFIGURE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on waiting for the product server to sync.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

// ── EndpointAddress ─────────────────────────────────────────────────

/// `(host, port)` of a product server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u16,
}

impl EndpointAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build an address from a port given as text, as master controllers
    /// pass it along from their own request arguments.
    pub fn from_parts(host: impl Into<String>, port: &str) -> Result<Self, ProductError> {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ProductError::Config {
                message: format!("invalid port '{port}'"),
            })?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for EndpointAddress {
    type Err = ProductError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| ProductError::Config {
            message: format!("expected host:port, got '{s}'"),
        })?;
        if host.is_empty() {
            return Err(ProductError::Config {
                message: format!("missing host in '{s}'"),
            });
        }
        Self::from_parts(host, port)
    }
}

// ── ProductConfig ───────────────────────────────────────────────────

/// Configuration for one product proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductConfig {
    /// Unique among the products of one master controller.
    pub product_id: String,
    pub address: EndpointAddress,
    /// Connection tuning for the KATCP client.
    pub transport: TransportConfig,
    pub configure_timeout: Duration,
    /// Bound on waiting for sync before each request. `None` waits forever.
    pub sync_timeout: Option<Duration>,
}

impl ProductConfig {
    pub fn new(product_id: impl Into<String>, address: EndpointAddress) -> Self {
        Self {
            product_id: product_id.into(),
            address,
            transport: TransportConfig::default(),
            configure_timeout: CONFIGURE_TIMEOUT,
            sync_timeout: Some(DEFAULT_SYNC_TIMEOUT),
        }
    }
}
