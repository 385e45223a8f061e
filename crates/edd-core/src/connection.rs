// ── Control connection capability ──
//
// The proxy drives its product server through this trait only, so the
// request logic can run against the real KATCP client or an in-memory
// stand-in.

use std::future::Future;
use std::time::Duration;

use edd_katcp::{KatcpClient, Reply};

use crate::error::ProductError;

/// A persistent request/response connection to one product server.
pub trait ControlConnection: Send + Sync + 'static {
    /// Begin connecting in the background. Must not block.
    fn start(&self);

    /// Suspend until the connection is synced and can take requests.
    ///
    /// Idempotent. Fails only if the connection has been stopped.
    fn until_synced(&self) -> impl Future<Output = Result<(), ProductError>> + Send;

    /// Send one named request. `None` uses the connection's default timeout.
    ///
    /// A not-ok answer is returned as a [`Reply`], not as an error.
    fn send_request(
        &self,
        name: &str,
        arguments: &[String],
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Reply, ProductError>> + Send;

    /// Release the connection's network resources.
    fn stop(&self);
}

impl ControlConnection for KatcpClient {
    fn start(&self) {
        KatcpClient::start(self);
    }

    async fn until_synced(&self) -> Result<(), ProductError> {
        KatcpClient::until_synced(self).await?;
        Ok(())
    }

    async fn send_request(
        &self,
        name: &str,
        arguments: &[String],
        timeout: Option<Duration>,
    ) -> Result<Reply, ProductError> {
        Ok(self.request(name, arguments, timeout).await?)
    }

    fn stop(&self) {
        KatcpClient::stop(self);
    }
}
