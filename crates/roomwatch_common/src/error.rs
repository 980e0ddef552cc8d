//! Error types for RoomWatch.

use thiserror::Error;

/// Fault taxonomy for the monitoring pipeline.
///
/// Every variant is caught and counted at the boundary of the
/// component that owns the risky call; only startup failures are
/// allowed to reach the process entry point.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Sensor fault on pin {pin}: {reason}")]
    SensorFault { pin: u8, reason: String },

    #[error("Camera capture fault: {0}")]
    CaptureFault(String),

    #[error("Alert delivery fault: {0}")]
    DeliveryFault(String),

    #[error("Storage cleanup fault at {path}: {reason}")]
    StorageFault { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonitorError {
    /// True for faults the sampling loop treats as "no signal" rather
    /// than propagating (fail-safe reads).
    pub fn is_sensor_fault(&self) -> bool {
        matches!(self, MonitorError::SensorFault { .. })
    }
}
