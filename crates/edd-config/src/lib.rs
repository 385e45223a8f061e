//! Configuration for EDD product proxies.
//!
//! A TOML file lists the product servers by product id, with shared
//! timeout defaults; `EDD_`-prefixed environment variables override the
//! file. Entries translate to `edd_core::ProductConfig`.
//!
//! ```toml
//! [defaults]
//! sync_timeout = 30
//!
//! [products.gated_spectrometer_0]
//! host = "edd01"
//! port = 7147
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use edd_core::{EndpointAddress, ProductConfig, TransportConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("product '{name}' is not configured (available: {available})")]
    ProductNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Product servers keyed by product id.
    #[serde(default)]
    pub products: BTreeMap<String, ProductEntry>,
}

/// Timeouts in seconds unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_configure_timeout")]
    pub configure_timeout: u64,

    /// 0 waits for sync forever.
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            configure_timeout: default_configure_timeout(),
            sync_timeout: default_sync_timeout(),
            connect_timeout: default_connect_timeout(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: None,
        }
    }
}

fn default_request_timeout() -> u64 {
    20
}
fn default_configure_timeout() -> u64 {
    edd_core::CONFIGURE_TIMEOUT.as_secs()
}
fn default_sync_timeout() -> u64 {
    edd_core::DEFAULT_SYNC_TIMEOUT.as_secs()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}

/// Port as written in the file: `7147` or `"7147"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Port {
    Number(u16),
    Text(String),
}

/// One product server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProductEntry {
    pub host: String,
    pub port: Port,

    /// Per-product overrides of the defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configure_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("de", "mpifr", "edd").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("edd");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields defaults.
///
/// Environment keys nest with a double underscore:
/// `EDD_DEFAULTS__SYNC_TIMEOUT=10`, `EDD_PRODUCTS__P1__HOST=edd02`.
/// Product ids keep their case; every other key segment is lowercased.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let env = Env::prefixed("EDD_")
        .split("__")
        .lowercase(false)
        .map(|key| env_key_path(key.as_str()).into());

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(env);

    Ok(figment.extract()?)
}

/// Lowercase a dotted env key path except the id in `products.<id>.*`.
fn env_key_path(key: &str) -> String {
    let mut segments: Vec<String> = key.split('.').map(str::to_owned).collect();
    let is_product = segments
        .first()
        .is_some_and(|s| s.eq_ignore_ascii_case("products"));
    for (i, segment) in segments.iter_mut().enumerate() {
        if !(is_product && i == 1) {
            segment.make_ascii_lowercase();
        }
    }
    segments.join(".")
}

/// Render the config as TOML.
pub fn render_config(cfg: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(cfg)?)
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    /// Build the `ProductConfig` for a configured product.
    pub fn product_config(&self, product_id: &str) -> Result<ProductConfig, ConfigError> {
        self.defaults
            .product_config(product_id, self.entry(product_id)?)
    }

    /// The file entry for `product_id`.
    pub fn entry(&self, product_id: &str) -> Result<&ProductEntry, ConfigError> {
        self.products
            .get(product_id)
            .ok_or_else(|| ConfigError::ProductNotFound {
                name: product_id.into(),
                available: self.available_products(),
            })
    }

    fn available_products(&self) -> String {
        if self.products.is_empty() {
            return "none".into();
        }
        self.products.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

impl Defaults {
    /// Build a `ProductConfig` for `entry`, filling gaps from these defaults.
    pub fn product_config(
        &self,
        product_id: &str,
        entry: &ProductEntry,
    ) -> Result<ProductConfig, ConfigError> {
        let address = match &entry.port {
            Port::Number(port) => EndpointAddress::new(entry.host.clone(), *port),
            Port::Text(port) => EndpointAddress::from_parts(entry.host.clone(), port)
                .map_err(|e| ConfigError::Validation {
                    field: format!("products.{product_id}.port"),
                    reason: e.to_string(),
                })?,
        };
        if entry.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: format!("products.{product_id}.host"),
                reason: "must not be empty".into(),
            });
        }

        let mut cfg = ProductConfig::new(product_id, address);
        cfg.transport = self.transport(entry);
        cfg.configure_timeout =
            Duration::from_secs(entry.configure_timeout.unwrap_or(self.configure_timeout));
        cfg.sync_timeout = match entry.sync_timeout.unwrap_or(self.sync_timeout) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Ok(cfg)
    }

    fn transport(&self, entry: &ProductEntry) -> TransportConfig {
        let mut transport = TransportConfig {
            request_timeout: Duration::from_secs(
                entry.request_timeout.unwrap_or(self.request_timeout),
            ),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ..TransportConfig::default()
        };
        transport.reconnect.initial_delay = Duration::from_millis(self.reconnect_initial_ms);
        transport.reconnect.max_delay = Duration::from_millis(self.reconnect_max_ms);
        transport.reconnect.max_retries = self.max_reconnect_attempts;
        transport
    }
}
