// ── In-memory sensor registry ──
//
// A self-contained `ProductParent` for running a proxy without a full
// master controller (the `edd` CLI and tests). Sensors live in a
// `DashMap`; mass informs go out on a broadcast channel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use edd_katcp::Message;

use crate::parent::ProductParent;
use crate::sensor::{Sensor, SensorStatus};

const INFORM_CHANNEL_SIZE: usize = 64;

pub struct SensorRegistry {
    sensors: DashMap<String, Sensor>,
    inform_tx: broadcast::Sender<Arc<Message>>,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorRegistry {
    pub fn new() -> Self {
        let (inform_tx, _) = broadcast::channel(INFORM_CHANNEL_SIZE);
        Self {
            sensors: DashMap::new(),
            inform_tx,
        }
    }

    /// All sensors, sorted by name.
    pub fn sensors(&self) -> Vec<Sensor> {
        let mut all: Vec<Sensor> = self.sensors.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn sensor(&self, name: &str) -> Option<Sensor> {
        self.sensors.get(name).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Subscribe to mass informs.
    pub fn subscribe_informs(&self) -> broadcast::Receiver<Arc<Message>> {
        self.inform_tx.subscribe()
    }
}

impl ProductParent for SensorRegistry {
    fn add_sensor(&self, sensor: Sensor) {
        debug!(sensor = %sensor.name, "sensor added");
        self.sensors.insert(sensor.name.clone(), sensor);
    }

    fn remove_sensor(&self, name: &str) -> bool {
        let removed = self.sensors.remove(name).is_some();
        debug!(sensor = name, removed, "sensor removed");
        removed
    }

    fn set_sensor_value(&self, name: &str, value: &str, status: SensorStatus) {
        match self.sensors.get_mut(name) {
            Some(mut sensor) => {
                if !sensor.set_value(value, status) {
                    warn!(sensor = name, value, "value rejected by sensor type");
                }
            }
            None => debug!(sensor = name, "update for unregistered sensor"),
        }
    }

    fn mass_inform(&self, message: Message) {
        info!(
            inform = %message,
            subscribers = self.inform_tx.receiver_count(),
            "mass inform"
        );
        // No subscribers is fine.
        let _ = self.inform_tx.send(Arc::new(message));
    }
}
