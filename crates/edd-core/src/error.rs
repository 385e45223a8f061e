// ── Core error types ──
//
// User-facing errors from edd-core. Transport-layer failures from
// edd-katcp are folded into connection-level variants by the
// `From<edd_katcp::Error>` impl; a remote `fail` reply always surfaces
// as `RemoteRequest` with the server's message untouched.

use thiserror::Error;

use crate::proxy::ProductState;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum ProductError {
    // ── Remote errors ────────────────────────────────────────────────
    /// The server answered with a not-ok status.
    #[error("'{request}' request failed with error: {message}")]
    RemoteRequest { request: String, message: String },

    #[error("Request '{request}' is not offered by the product server")]
    UnsupportedRequest { request: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Product server at {address} not ready after {waited_secs}s")]
    ConnectionUnavailable { address: String, waited_secs: u64 },

    #[error("Cannot reach product server at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Product server connection closed")]
    Disconnected,

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Cannot {operation} while product is {state}")]
    InvalidState {
        operation: String,
        state: ProductState,
    },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Configuration could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ProductError {
    /// The server-supplied message of a failed remote request.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::RemoteRequest { message, .. } => Some(message),
            _ => None,
        }
    }

    pub(crate) fn invalid_state(operation: &str, state: ProductState) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<edd_katcp::Error> for ProductError {
    fn from(err: edd_katcp::Error) -> Self {
        match err {
            edd_katcp::Error::Stopped => ProductError::Disconnected,
            edd_katcp::Error::UnknownRequest { name } => {
                ProductError::UnsupportedRequest { request: name }
            }
            edd_katcp::Error::NotConnected { address } => ProductError::ConnectionFailed {
                address,
                reason: "no live connection".into(),
            },
            edd_katcp::Error::ConnectTimeout {
                address,
                timeout_secs,
            } => ProductError::ConnectionUnavailable {
                address,
                waited_secs: timeout_secs,
            },
            edd_katcp::Error::Handshake { address, message } => ProductError::ConnectionFailed {
                address,
                reason: format!("handshake rejected: {message}"),
            },
            e @ (edd_katcp::Error::Io(_)
            | edd_katcp::Error::Codec(_)
            | edd_katcp::Error::Parse { .. }) => ProductError::Transport {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_message_is_exposed_verbatim() {
        let err = ProductError::RemoteRequest {
            request: "capture_start".into(),
            message: "device busy".into(),
        };
        assert_eq!(err.remote_message(), Some("device busy"));
        assert_eq!(
            err.to_string(),
            "'capture_start' request failed with error: device busy"
        );
        assert_eq!(ProductError::Disconnected.remote_message(), None);
    }

    #[test]
    fn transport_errors_map_to_connection_variants() {
        let stopped: ProductError = edd_katcp::Error::Stopped.into();
        assert!(matches!(stopped, ProductError::Disconnected));

        let unknown: ProductError = edd_katcp::Error::UnknownRequest {
            name: "capture-start".into(),
        }
        .into();
        assert!(
            matches!(unknown, ProductError::UnsupportedRequest { ref request } if request == "capture-start")
        );

        let io: ProductError =
            edd_katcp::Error::Io(std::io::Error::other("connection reset")).into();
        assert!(matches!(io, ProductError::Transport { .. }));
    }

    #[test]
    fn invalid_state_names_operation_and_state() {
        let err = ProductError::invalid_state("configure", ProductState::Deconfigured);
        assert_eq!(err.to_string(), "Cannot configure while product is deconfigured");
    }
}
