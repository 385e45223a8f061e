use thiserror::Error;

/// Top-level error type for the `edd-katcp` crate.
///
/// Covers every failure mode of the client that is not a remote `fail`
/// reply: socket I/O, framing, malformed messages, and client lifecycle.
/// A remote `fail`/`invalid` reply is *not* an error at this layer; it is
/// returned as a [`Reply`](crate::Reply) for the caller to classify.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level failure (connection refused, reset, DNS failure, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing failed (line too long or I/O error inside the codec).
    #[error("Line framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// Connecting to the server took longer than the configured timeout.
    #[error("Connection to {address} timed out after {timeout_secs}s")]
    ConnectTimeout { address: String, timeout_secs: u64 },

    /// No live connection to hand the request to.
    #[error("Not connected to {address}")]
    NotConnected { address: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// A line could not be parsed as a KATCP message.
    #[error("Malformed KATCP message: {reason}")]
    Parse { reason: String },

    /// The server rejected the `?help` catalog exchange.
    #[error("Handshake with {address} failed: {message}")]
    Handshake { address: String, message: String },

    /// The request is not in the catalog the server advertised.
    #[error("Unknown request '{name}' (not advertised by the server)")]
    UnknownRequest { name: String },

    // ── Lifecycle ───────────────────────────────────────────────────
    /// The client was stopped; no further requests are possible.
    #[error("KATCP client stopped")]
    Stopped,
}

impl Error {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    /// Returns `true` if reconnecting might resolve this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Codec(_) | Self::ConnectTimeout { .. } | Self::NotConnected { .. }
        )
    }
}
