// edd-katcp: Async KATCP v5 client for EDD product servers

pub mod client;
pub mod error;
pub mod message;
pub mod transport;

pub use client::{ConnectionState, KatcpClient, Reply};
pub use error::Error;
pub use message::{Message, MessageKind};
pub use transport::{ReconnectConfig, TransportConfig};
