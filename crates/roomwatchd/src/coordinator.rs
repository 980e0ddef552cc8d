//! Alert coordination - cooldown gating and payload construction.
//!
//! Decides whether a detected condition may become an alert right now,
//! and if so snapshots the evidence buffer and builds the payload.
//! Purely synchronous CPU work; no I/O happens here.

use crate::clock::Clock;
use crate::frame_buffer::FrameBuffer;
use chrono::SecondsFormat;
use roomwatch_common::{AlertEvent, SensorReading, SensorType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Owns the per-type cooldown table. Only ever touched from the
/// monitor task, so no lock is needed.
pub struct AlertCoordinator {
    clock: Arc<dyn Clock>,
    frames: Arc<FrameBuffer>,
    cooldown: Duration,
    location: String,
    /// event type -> monotonic time the last alert was created
    last_fired: HashMap<SensorType, Duration>,
    suppressed: u64,
    fired: u64,
}

impl AlertCoordinator {
    pub fn new(
        clock: Arc<dyn Clock>,
        frames: Arc<FrameBuffer>,
        cooldown: Duration,
        location: String,
    ) -> Self {
        Self {
            clock,
            frames,
            cooldown,
            location,
            last_fired: HashMap::new(),
            suppressed: 0,
            fired: 0,
        }
    }

    /// Evaluate one newly-triggered event type.
    ///
    /// When eligible, the cooldown entry is stamped immediately, before
    /// the event is handed off for delivery. Slow or failing delivery
    /// therefore cannot cause duplicate firing. Types are independent:
    /// smoke firing never suppresses flame in the same tick.
    pub fn evaluate(
        &mut self,
        event_type: SensorType,
        reading: Option<SensorReading>,
    ) -> Option<AlertEvent> {
        let now = self.clock.monotonic();

        if let Some(last) = self.last_fired.get(&event_type) {
            if now.saturating_sub(*last) < self.cooldown {
                self.suppressed += 1;
                info!(
                    "Suppressed {} alert (cooldown active, {} suppressed total)",
                    event_type, self.suppressed
                );
                return None;
            }
        }

        self.last_fired.insert(event_type, now);
        self.fired += 1;

        let created_at = self.clock.wall();
        let evidence = self.frames.snapshot();
        let correlation_id = Uuid::new_v4();

        let event = AlertEvent {
            event_type,
            created_at,
            subject: self.format_subject(event_type),
            message: self.format_body(event_type, created_at, reading.as_ref(), evidence.len()),
            evidence,
            correlation_id,
            reading,
        };

        info!(
            "Alert created: {} ({} evidence frames, correlation {})",
            event_type,
            event.evidence.len(),
            correlation_id
        );

        Some(event)
    }

    /// Alerts blocked by the cooldown gate since startup.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    /// Alerts created since startup.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    fn format_subject(&self, event_type: SensorType) -> String {
        format!("[WARNING] RoomWatch - {}", event_type)
    }

    fn format_body(
        &self,
        event_type: SensorType,
        created_at: chrono::DateTime<chrono::Utc>,
        reading: Option<&SensorReading>,
        frame_count: usize,
    ) -> String {
        let mut body = format!(
            "RoomWatch hazard alert\n\
             ======================\n\
             \n\
             Alert Type: {}\n\
             Time: {}\n\
             Location: {}\n\
             Evidence: {} buffered frames attached\n",
            event_type,
            created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.location,
            frame_count,
        );

        if let Some(r) = reading {
            body.push_str(&format!(
                "Sensor: {} (value {:?})\n",
                r.sensor_id, r.value
            ));
        }

        body.push_str(
            "\nAction Required: please investigate immediately.\n\
             \n\
             This is an automated message from the RoomWatch monitoring system.",
        );

        body
    }
}
