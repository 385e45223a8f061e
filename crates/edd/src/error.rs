//! CLI error types with miette diagnostics.
//!
//! Maps `ProductError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use edd_config::ConfigError;
use edd_core::ProductError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const REMOTE: i32 = 3;
    pub const STATE: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Remote ───────────────────────────────────────────────────────
    #[error("'{request}' request failed with error: {message}")]
    #[diagnostic(
        code(edd::remote_failure),
        help("The product server rejected the request; check its logs.")
    )]
    Remote { request: String, message: String },

    #[error("Request '{request}' is not offered by the product server")]
    #[diagnostic(code(edd::unsupported))]
    Unsupported { request: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach product server at {address}")]
    #[diagnostic(
        code(edd::connection_failed),
        help(
            "Check that the product server is running and accessible.\n\
             Increase the wait with --sync-timeout, or 0 to wait forever."
        )
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("{message}")]
    #[diagnostic(code(edd::transport))]
    Transport { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(edd::invalid_state))]
    InvalidState { message: String },

    // ── Usage ────────────────────────────────────────────────────────
    #[error("No product selected")]
    #[diagnostic(
        code(edd::no_product),
        help("Pass --product <ID> or set EDD_PRODUCT.")
    )]
    NoProduct,

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(edd::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Product '{name}' not found in configuration")]
    #[diagnostic(
        code(edd::product_not_found),
        help(
            "Available products: {available}\n\
             Add one under [products.{name}] in {path}, or pass --host and --port."
        )
    )]
    ProductNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(code(edd::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON configuration: {0}")]
    #[diagnostic(code(edd::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Remote { .. } | Self::Unsupported { .. } => exit_code::REMOTE,
            Self::ConnectionFailed { .. } | Self::Transport { .. } => exit_code::CONNECTION,
            Self::InvalidState { .. } => exit_code::STATE,
            Self::NoProduct | Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library errors → CliError ────────────────────────────────────────

impl From<ProductError> for CliError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::RemoteRequest { request, message } => Self::Remote { request, message },
            ProductError::UnsupportedRequest { request } => Self::Unsupported { request },
            ProductError::ConnectionUnavailable {
                address,
                waited_secs,
            } => Self::ConnectionFailed {
                address,
                reason: format!("not ready after {waited_secs}s"),
            },
            ProductError::ConnectionFailed { address, reason } => {
                Self::ConnectionFailed { address, reason }
            }
            err @ (ProductError::Disconnected | ProductError::Transport { .. }) => {
                Self::Transport {
                    message: err.to_string(),
                }
            }
            err @ ProductError::InvalidState { .. } => Self::InvalidState {
                message: err.to_string(),
            },
            ProductError::Serialization(err) => Self::Json(err),
            ProductError::Config { message } => Self::Validation {
                field: "product".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProductNotFound { name, available } => Self::ProductNotFound {
                name,
                available,
                path: edd_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
