// ── Remote product proxy ──
//
// Represents one EDD server product inside a master controller. Lifecycle
// commands are forwarded to the product server over a persistent control
// connection; the product's sensors are registered with the parent.
//
// Every request goes through `invoke`, which waits for the connection to
// sync, sends, and turns a not-ok reply into `ProductError::RemoteRequest`.
// Lifecycle operations additionally pass through a per-proxy gate so that
// two of them never overlap on the same product.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{Instrument, Span, debug, error, info, info_span};

use edd_katcp::{KatcpClient, Message, Reply};

use crate::config::{EndpointAddress, ProductConfig};
use crate::connection::ControlConnection;
use crate::error::ProductError;
use crate::parent::ProductParent;
use crate::sensor::{Sensor, SensorStatus};

const DUMMY_SENSOR: &str = "dummy-sensor";
const STATE_SENSOR: &str = "state";
const STATE_VALUES: &[&str] = &["idle", "ready", "configured", "capturing", "deconfigured"];

// ── ProductState ─────────────────────────────────────────────────

/// Lifecycle state of a product proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProductState {
    /// Connection started; sensors not yet installed.
    Constructed,
    SensorsReady,
    /// Configured at least once.
    Active,
    /// Terminal: connection released, no further operations.
    Deconfigured,
}

// ── RemoteProductProxy ───────────────────────────────────────────

/// Control proxy for one product served by a remote KATCP server.
pub struct RemoteProductProxy<C: ControlConnection = KatcpClient> {
    product_id: String,
    address: EndpointAddress,
    parent: Arc<dyn ProductParent>,
    connection: C,
    configure_timeout: Duration,
    sync_timeout: Option<Duration>,
    state: watch::Sender<ProductState>,
    capturing: AtomicBool,
    /// Names of the sensors this proxy registered with the parent.
    sensors: Mutex<Vec<String>>,
    op_gate: tokio::sync::Mutex<()>,
    span: Span,
}

impl RemoteProductProxy<KatcpClient> {
    /// Create a proxy talking KATCP to `config.address` and start connecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(parent: Arc<dyn ProductParent>, config: ProductConfig) -> Self {
        let client = KatcpClient::new(
            format!("server-client_{}", config.product_id),
            config.address.to_string(),
            config.transport.clone(),
        );
        Self::with_connection(parent, config, client)
    }
}

impl<C: ControlConnection> RemoteProductProxy<C> {
    /// Create a proxy over an existing connection and start it.
    pub fn with_connection(
        parent: Arc<dyn ProductParent>,
        config: ProductConfig,
        connection: C,
    ) -> Self {
        let span = info_span!("product", id = %config.product_id);
        debug!(parent: &span, address = %config.address, "creating product proxy");

        connection.start();
        let (state, _) = watch::channel(ProductState::Constructed);

        Self {
            product_id: config.product_id,
            address: config.address,
            parent,
            connection,
            configure_timeout: config.configure_timeout,
            sync_timeout: config.sync_timeout,
            state,
            capturing: AtomicBool::new(false),
            sensors: Mutex::new(Vec::new()),
            op_gate: tokio::sync::Mutex::new(()),
            span,
        }
    }

    /// Log under `span` instead of the default per-product span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn state(&self) -> ProductState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ProductState> {
        self.state.subscribe()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Names of the sensors currently registered by this proxy.
    pub fn sensor_names(&self) -> Vec<String> {
        self.registered().clone()
    }

    // ── Sensors ──────────────────────────────────────────────────

    /// Register the product's sensors with the parent, then announce the
    /// new interface with a single `#interface-changed` mass inform.
    pub fn setup_sensors(&self) -> Result<(), ProductError> {
        let _entered = self.span.enter();
        {
            let mut registered = self.registered();
            let state = self.state();
            if state != ProductState::Constructed || !registered.is_empty() {
                return Err(ProductError::invalid_state("setup sensors", state));
            }

            let sensors = [
                Sensor::discrete(
                    self.sensor_name(STATE_SENSOR),
                    "Lifecycle state of the product",
                    STATE_VALUES,
                    "ready",
                ),
                Sensor::string(
                    self.sensor_name(DUMMY_SENSOR),
                    "dummy sensor as alpha version of code",
                    "ALPHA VERSION OF CODE, NO MORE SENSORS HERE",
                    SensorStatus::Unknown,
                ),
            ];
            for sensor in sensors {
                registered.push(sensor.name.clone());
                self.parent.add_sensor(sensor);
            }
            info!(sensors = registered.len(), "sensors installed");
        }

        self.transition(ProductState::SensorsReady);
        self.announce_interface_change();
        Ok(())
    }

    // ── Lifecycle operations ─────────────────────────────────────

    /// Send `config` to the product server as JSON.
    pub async fn configure<T>(&self, config: &T) -> Result<Reply, ProductError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let _gate = self.op_gate.lock().await;
        self.ensure_operational("configure")?;
        let payload = serde_json::to_string(config)?;

        debug!(parent: &self.span, bytes = payload.len(), "sending configuration");
        let reply = self
            .invoke("configure", &[payload], Some(self.configure_timeout))
            .await?;
        self.transition(ProductState::Active);
        Ok(reply)
    }

    /// Deconfigure the product and release the connection.
    ///
    /// On success the proxy removes the sensors it registered and is
    /// unusable afterwards; the caller should drop it.
    pub async fn deconfigure(&self) -> Result<Reply, ProductError> {
        let _gate = self.op_gate.lock().await;
        self.ensure_operational("deconfigure")?;

        let reply = self.invoke("deconfigure", &[], None).await?;

        self.connection.stop();
        self.capturing.store(false, Ordering::SeqCst);
        self.teardown_sensors();
        self.transition(ProductState::Deconfigured);
        Ok(reply)
    }

    pub async fn capture_start(&self) -> Result<Reply, ProductError> {
        let _gate = self.op_gate.lock().await;
        self.ensure_operational("capture_start")?;

        let reply = self.invoke("capture_start", &[], None).await?;
        self.capturing.store(true, Ordering::SeqCst);
        self.publish_state();
        Ok(reply)
    }

    pub async fn capture_stop(&self) -> Result<Reply, ProductError> {
        let _gate = self.op_gate.lock().await;
        self.ensure_operational("capture_stop")?;

        let reply = self.invoke("capture_stop", &[], None).await?;
        self.capturing.store(false, Ordering::SeqCst);
        self.publish_state();
        Ok(reply)
    }

    // ── Request dispatch ─────────────────────────────────────────

    /// Send one request once the connection is synced.
    ///
    /// An ok reply is returned unchanged. A not-ok reply becomes
    /// [`ProductError::RemoteRequest`] carrying the server's message.
    /// Nothing is retried.
    pub async fn invoke(
        &self,
        request: &str,
        arguments: &[String],
        timeout: Option<Duration>,
    ) -> Result<Reply, ProductError> {
        async {
            info!(request, ?arguments, "sending request");
            self.wait_until_synced().await?;

            let reply = self
                .connection
                .send_request(request, arguments, timeout)
                .await?;

            if reply.is_ok() {
                debug!(request, "request successful");
                Ok(reply)
            } else {
                let message = reply.error_message().unwrap_or_default().to_string();
                error!(request, %message, "request failed");
                Err(ProductError::RemoteRequest {
                    request: request.into(),
                    message,
                })
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn wait_until_synced(&self) -> Result<(), ProductError> {
        let Some(limit) = self.sync_timeout else {
            return self.connection.until_synced().await;
        };
        tokio::time::timeout(limit, self.connection.until_synced())
            .await
            .map_err(|_| ProductError::ConnectionUnavailable {
                address: self.address.to_string(),
                waited_secs: limit.as_secs(),
            })?
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn ensure_operational(&self, operation: &str) -> Result<(), ProductError> {
        match self.state() {
            ProductState::Deconfigured => Err(ProductError::invalid_state(
                operation,
                ProductState::Deconfigured,
            )),
            _ => Ok(()),
        }
    }

    fn registered(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.sensors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sensor_name(&self, name: &str) -> String {
        format!("{}.{}", self.product_id, name)
    }

    fn transition(&self, next: ProductState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(parent: &self.span, from = %previous, to = %next, "state change");
        }
        self.publish_state();
    }

    /// Mirror the lifecycle state into the state sensor, if installed.
    fn publish_state(&self) {
        let name = self.sensor_name(STATE_SENSOR);
        if !self.registered().contains(&name) {
            return;
        }
        let value = match (self.state(), self.is_capturing()) {
            (ProductState::Deconfigured, _) => "deconfigured",
            (_, true) => "capturing",
            (ProductState::Active, false) => "configured",
            (ProductState::SensorsReady, false) => "ready",
            (ProductState::Constructed, false) => "idle",
        };
        self.parent
            .set_sensor_value(&name, value, SensorStatus::Nominal);
    }

    fn teardown_sensors(&self) {
        let removed = std::mem::take(&mut *self.registered());
        if removed.is_empty() {
            return;
        }
        for name in &removed {
            self.parent.remove_sensor(name);
        }
        debug!(parent: &self.span, sensors = removed.len(), "sensors removed");
        self.announce_interface_change();
    }

    fn announce_interface_change(&self) {
        self.parent
            .mass_inform(Message::inform("interface-changed", Vec::<String>::new()));
    }
}

impl<C: ControlConnection> Drop for RemoteProductProxy<C> {
    fn drop(&mut self) {
        self.connection.stop();
    }
}
