//! Core data model shared between the daemon and its tests.
//!
//! Readings and frames are created on every polling tick and die by
//! eviction; alert events live from coordinator creation to dispatcher
//! completion and are never mutated in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Hazard channel monitored by the daemon.
///
/// Alert events are keyed by the same enum: one cooldown entry per
/// channel, independent of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Smoke,
    Flame,
    Water,
    Temperature,
    Humidity,
}

impl SensorType {
    /// Upper-case label used in archive names and mail subjects,
    /// e.g. `SMOKE_2026-08-29T10:00:00.zip`.
    pub fn label(&self) -> &'static str {
        match self {
            SensorType::Smoke => "SMOKE",
            SensorType::Flame => "FLAME",
            SensorType::Water => "WATER",
            SensorType::Temperature => "TEMPERATURE",
            SensorType::Humidity => "HUMIDITY",
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Value carried by a reading: digital channels are boolean, the
/// environment probe reports numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Bool(bool),
    Number(f64),
}

impl ReadingValue {
    /// Polarity-corrected hazard interpretation of the value.
    pub fn is_positive(&self) -> bool {
        match self {
            ReadingValue::Bool(b) => *b,
            ReadingValue::Number(n) => *n > 0.0,
        }
    }
}

/// One sensor sample. Immutable once produced; owned transiently by
/// the loop iteration that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub timestamp: DateTime<Utc>,
    /// Polarity-corrected value (true = hazard present).
    pub value: ReadingValue,
    /// Raw value before polarity correction, when available.
    pub raw_value: Option<ReadingValue>,
}

impl SensorReading {
    pub fn digital(sensor_id: &str, sensor_type: SensorType, value: bool, raw: bool) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            sensor_type,
            timestamp: Utc::now(),
            value: ReadingValue::Bool(value),
            raw_value: Some(ReadingValue::Bool(raw)),
        }
    }
}

/// Temperature/humidity pair from the environment probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnvReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

/// One buffered camera frame. The JPEG bytes are shared, so cloning an
/// entry for a snapshot never copies the image itself.
#[derive(Debug, Clone)]
pub struct FrameEntry {
    pub timestamp: DateTime<Utc>,
    pub image: Arc<[u8]>,
    /// Channels that were reading positive when this frame was taken.
    pub sensor_flags: Vec<SensorType>,
}

impl FrameEntry {
    pub fn new(image: Vec<u8>, sensor_flags: Vec<SensorType>) -> Self {
        Self {
            timestamp: Utc::now(),
            image: image.into(),
            sensor_flags,
        }
    }
}

/// A detected condition that passed the cooldown gate, together with
/// the evidence captured at the moment it fired.
///
/// Consumed exactly once by the dispatcher; never mutated after
/// creation.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub event_type: SensorType,
    pub created_at: DateTime<Utc>,
    pub subject: String,
    pub message: String,
    pub evidence: Vec<FrameEntry>,
    pub correlation_id: Uuid,
    /// The reading that pushed the debouncer over its threshold.
    pub reading: Option<SensorReading>,
}

/// Terminal outcome of one alert's journey through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
    Dropped,
}

/// Audit record appended after every terminal delivery outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub event_type: SensorType,
    pub correlation_id: Uuid,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn new(
        event: &AlertEvent,
        attempts: u32,
        outcome: DeliveryOutcome,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            correlation_id: event.correlation_id,
            attempts,
            outcome,
            error,
            timestamp: Utc::now(),
        }
    }
}
