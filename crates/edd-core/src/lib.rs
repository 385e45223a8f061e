// edd-core: Product proxy between a master controller and an EDD server product.

pub mod config;
pub mod connection;
pub mod error;
pub mod parent;
pub mod proxy;
pub mod registry;
pub mod sensor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CONFIGURE_TIMEOUT, DEFAULT_SYNC_TIMEOUT, EndpointAddress, ProductConfig};
pub use connection::ControlConnection;
pub use error::ProductError;
pub use parent::ProductParent;
pub use proxy::{ProductState, RemoteProductProxy};
pub use registry::SensorRegistry;
pub use sensor::{Sensor, SensorStatus, SensorType};

// Wire types callers need to talk to the proxy and its parent.
pub use edd_katcp::{Message, Reply, TransportConfig};
