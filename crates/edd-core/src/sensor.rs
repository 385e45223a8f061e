//! Sensor descriptors a product registers with its parent controller.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// KATCP sensor status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SensorStatus {
    Unknown,
    Nominal,
    Warn,
    Error,
    Failure,
    Unreachable,
    Inactive,
}

/// Value type of a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum SensorType {
    String,
    /// One of a fixed set of values.
    Discrete(Vec<String>),
}

/// A named monitoring attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sensor {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub sensor_type: SensorType,
    pub value: String,
    pub status: SensorStatus,
    pub timestamp: DateTime<Utc>,
}

impl Sensor {
    pub fn string(
        name: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
        initial_status: SensorStatus,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sensor_type: SensorType::String,
            value: default.into(),
            status: initial_status,
            timestamp: Utc::now(),
        }
    }

    /// A discrete sensor starting at `default` with nominal status.
    pub fn discrete(
        name: impl Into<String>,
        description: impl Into<String>,
        params: &[&str],
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sensor_type: SensorType::Discrete(params.iter().map(|p| (*p).to_string()).collect()),
            value: default.into(),
            status: SensorStatus::Nominal,
            timestamp: Utc::now(),
        }
    }

    /// Whether `value` is legal for this sensor's type.
    pub fn accepts(&self, value: &str) -> bool {
        match &self.sensor_type {
            SensorType::String => true,
            SensorType::Discrete(params) => params.iter().any(|p| p == value),
        }
    }

    /// Set a new reading. Returns `false` (and leaves the sensor alone)
    /// if the value is not legal for the sensor type.
    pub fn set_value(&mut self, value: &str, status: SensorStatus) -> bool {
        if !self.accepts(value) {
            return false;
        }
        value.clone_into(&mut self.value);
        self.status = status;
        self.timestamp = Utc::now();
        true
    }
}
