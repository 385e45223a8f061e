//! The capability a product proxy needs from its master controller.

use edd_katcp::Message;

use crate::sensor::{Sensor, SensorStatus};

/// Owner of the sensor registry and the client broadcast channel.
///
/// Implemented by the master controller. The proxy only adds, updates
/// and removes the sensors it registered itself, and announces
/// interface changes through [`mass_inform`](Self::mass_inform).
pub trait ProductParent: Send + Sync {
    fn add_sensor(&self, sensor: Sensor);

    /// Returns `false` if no sensor of that name was registered.
    fn remove_sensor(&self, name: &str) -> bool;

    fn set_sensor_value(&self, name: &str, value: &str, status: SensorStatus);

    /// Send an inform to every connected client.
    fn mass_inform(&self, message: Message);
}
