//! Sensor debouncing - consecutive-count thresholds per channel.
//!
//! A channel is considered triggered only after N consecutive positive
//! samples; a single negative sample clears an in-progress detection.
//! `observe` is edge-triggered: it reports true exactly once per
//! episode, on the sample that first crosses the threshold.

use roomwatch_common::SensorType;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Per-channel debounce state.
#[derive(Debug, Clone)]
pub struct DebounceState {
    pub consecutive_count: u32,
    pub threshold: u32,
    pub triggered: bool,
    /// Read failures on this channel (fail-safe: counted, never fired).
    pub fault_count: u64,
}

impl DebounceState {
    fn new(threshold: u32) -> Self {
        Self {
            consecutive_count: 0,
            threshold,
            triggered: false,
            fault_count: 0,
        }
    }
}

/// Converts raw boolean samples into triggered/not-triggered decisions.
///
/// Channels are independent; there is no cross-channel coupling.
pub struct SensorDebouncer {
    channels: HashMap<SensorType, DebounceState>,
}

impl SensorDebouncer {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Register a channel with its consecutive-count threshold.
    /// Re-registering resets the channel's state.
    pub fn register(&mut self, sensor_type: SensorType, threshold: u32) {
        let threshold = threshold.max(1);
        self.channels
            .insert(sensor_type, DebounceState::new(threshold));
    }

    /// Feed one polarity-corrected sample (true = hazard present).
    ///
    /// Returns true only on the sample where the consecutive count
    /// first reaches the channel's threshold. Repeat suppression
    /// beyond that edge is the coordinator's cooldown, not ours.
    pub fn observe(&mut self, sensor_type: SensorType, value: bool) -> bool {
        let state = match self.channels.get_mut(&sensor_type) {
            Some(s) => s,
            None => {
                warn!("Sample for unregistered channel {}", sensor_type);
                return false;
            }
        };

        if !value {
            state.consecutive_count = 0;
            state.triggered = false;
            return false;
        }

        state.consecutive_count += 1;
        let now_triggered = state.consecutive_count >= state.threshold;
        let newly_triggered = now_triggered && !state.triggered;
        state.triggered = now_triggered;

        if newly_triggered {
            debug!(
                "{} crossed debounce threshold ({} consecutive)",
                sensor_type, state.consecutive_count
            );
        }

        newly_triggered
    }

    /// Record a failed read on a channel. Fail-safe: treated as a
    /// negative sample (absence of signal never fires an alert), but
    /// counted so persistent hardware failure stays visible.
    pub fn record_fault(&mut self, sensor_type: SensorType) {
        if let Some(state) = self.channels.get_mut(&sensor_type) {
            state.fault_count += 1;
            state.consecutive_count = 0;
            state.triggered = false;
        }
    }

    pub fn fault_count(&self, sensor_type: SensorType) -> u64 {
        self.channels
            .get(&sensor_type)
            .map(|s| s.fault_count)
            .unwrap_or(0)
    }

    pub fn state(&self, sensor_type: SensorType) -> Option<&DebounceState> {
        self.channels.get(&sensor_type)
    }
}

impl Default for SensorDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer(threshold: u32) -> SensorDebouncer {
        let mut d = SensorDebouncer::new();
        d.register(SensorType::Smoke, threshold);
        d
    }

    #[test]
    fn test_fires_exactly_on_threshold_crossing() {
        let mut d = debouncer(3);
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(d.observe(SensorType::Smoke, true));
    }

    #[test]
    fn test_does_not_refire_while_still_positive() {
        let mut d = debouncer(2);
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(d.observe(SensorType::Smoke, true));
        // still hazardous, but the edge already fired
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(!d.observe(SensorType::Smoke, true));
    }

    #[test]
    fn test_single_negative_resets_count() {
        let mut d = debouncer(3);
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(!d.observe(SensorType::Smoke, false));
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(!d.observe(SensorType::Smoke, true));
        // count restarted after the negative, so only now does it fire
        assert!(d.observe(SensorType::Smoke, true));
    }

    #[test]
    fn test_refires_after_episode_clears() {
        let mut d = debouncer(2);
        d.observe(SensorType::Smoke, true);
        assert!(d.observe(SensorType::Smoke, true));
        d.observe(SensorType::Smoke, false);
        d.observe(SensorType::Smoke, true);
        assert!(d.observe(SensorType::Smoke, true));
    }

    #[test]
    fn test_threshold_one_fires_immediately() {
        let mut d = debouncer(1);
        assert!(d.observe(SensorType::Smoke, true));
        assert!(!d.observe(SensorType::Smoke, true));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut d = SensorDebouncer::new();
        d.register(SensorType::Smoke, 2);
        d.register(SensorType::Flame, 2);

        d.observe(SensorType::Smoke, true);
        assert!(!d.observe(SensorType::Flame, true));
        assert!(d.observe(SensorType::Smoke, true));
        assert!(d.observe(SensorType::Flame, true));
    }

    #[test]
    fn test_fault_counts_and_resets() {
        let mut d = debouncer(2);
        d.observe(SensorType::Smoke, true);
        d.record_fault(SensorType::Smoke);
        assert_eq!(d.fault_count(SensorType::Smoke), 1);
        // fault behaved like a negative sample
        assert!(!d.observe(SensorType::Smoke, true));
        assert!(d.observe(SensorType::Smoke, true));
    }

    #[test]
    fn test_invariant_triggered_matches_count() {
        let mut d = debouncer(3);
        for _ in 0..5 {
            d.observe(SensorType::Smoke, true);
            let s = d.state(SensorType::Smoke).unwrap();
            assert_eq!(s.triggered, s.consecutive_count >= s.threshold);
        }
        d.observe(SensorType::Smoke, false);
        let s = d.state(SensorType::Smoke).unwrap();
        assert_eq!(s.consecutive_count, 0);
        assert!(!s.triggered);
    }
}
