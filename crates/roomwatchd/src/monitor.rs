//! Monitor loop - the fixed-cadence tick driving the whole pipeline.
//!
//! Every tick samples the digital channels, captures a frame into the
//! rolling buffer, feeds the debouncer, and hands newly-triggered
//! conditions to the coordinator. A fault on one channel never stops
//! the others from being sampled; a tick that fails outright is
//! logged, counted, and followed by a short backoff rather than a
//! crash. Shutdown is observed at tick boundaries only, so a tick is
//! never torn down halfway.

use crate::clock::Clock;
use crate::config::{ChannelConfig, Config};
use crate::coordinator::AlertCoordinator;
use crate::debounce::SensorDebouncer;
use crate::dispatcher::AlertDispatcher;
use crate::frame_buffer::FrameBuffer;
use crate::hardware::{Camera, EnvProbe, GpioReader};
use crate::status::MonitorStatus;
use anyhow::{bail, Result};
use chrono::Utc;
use roomwatch_common::{FrameEntry, ReadingValue, SensorReading, SensorType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

pub struct MonitorLoop {
    config: Config,
    gpio: Arc<dyn GpioReader>,
    camera: Option<Arc<dyn Camera>>,
    env_probe: Option<Arc<dyn EnvProbe>>,
    frames: Arc<FrameBuffer>,
    debouncer: SensorDebouncer,
    coordinator: AlertCoordinator,
    dispatcher: AlertDispatcher,
    status: Arc<MonitorStatus>,
}

impl MonitorLoop {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        gpio: Arc<dyn GpioReader>,
        camera: Option<Arc<dyn Camera>>,
        env_probe: Option<Arc<dyn EnvProbe>>,
        frames: Arc<FrameBuffer>,
        dispatcher: AlertDispatcher,
        status: Arc<MonitorStatus>,
    ) -> Self {
        let mut debouncer = SensorDebouncer::new();
        for (sensor_type, channel) in digital_channels(&config) {
            if channel.enabled {
                debouncer.register(sensor_type, config.sensors.threshold_for(sensor_type));
            }
        }
        if env_probe.is_some() && config.sensors.env_probe_enabled {
            for sensor_type in [SensorType::Temperature, SensorType::Humidity] {
                debouncer.register(sensor_type, config.sensors.threshold_for(sensor_type));
            }
        }

        let coordinator = AlertCoordinator::new(
            clock,
            Arc::clone(&frames),
            Duration::from_secs(config.alerts.cooldown_secs),
            config.alerts.location.clone(),
        );

        Self {
            config,
            gpio,
            camera,
            env_probe,
            frames,
            debouncer,
            coordinator,
            dispatcher,
            status,
        }
    }

    /// Drive ticks at the configured cadence until shutdown flips.
    /// Sleep is compensated for tick duration, so cadence holds as
    /// long as a tick fits inside the interval.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.monitor.poll_interval_secs.max(1));
        let backoff = Duration::from_secs(self.config.monitor.error_backoff_secs);
        info!("Monitor loop started (interval {:?})", interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            MonitorStatus::incr(&self.status.ticks);

            let pause = match self.tick() {
                Ok(()) => interval.saturating_sub(started.elapsed()),
                Err(e) => {
                    MonitorStatus::incr(&self.status.tick_errors);
                    warn!("Monitor tick failed: {:#}", e);
                    backoff
                }
            };

            self.maybe_log_status();

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Monitor loop stopped");
    }

    /// One sampling pass. Individual channel faults are absorbed; the
    /// tick only fails when every enabled digital channel faulted,
    /// which points at the bus rather than a single sensor.
    pub fn tick(&mut self) -> Result<()> {
        let mut readings: Vec<SensorReading> = Vec::new();
        let mut attempted = 0u32;

        for (sensor_type, channel) in digital_channels(&self.config) {
            if !channel.enabled {
                continue;
            }
            attempted += 1;
            match self.gpio.read_pin(channel.pin) {
                Ok(raw) => {
                    let active = if channel.inverted { !raw } else { raw };
                    readings.push(SensorReading::digital(
                        &format!("gpio{}", channel.pin),
                        sensor_type,
                        active,
                        raw,
                    ));
                    MonitorStatus::incr(&self.status.readings);
                }
                Err(e) => {
                    warn!("Sensor read failed ({}): {}", sensor_type, e);
                    MonitorStatus::incr(&self.status.sensor_faults);
                    self.debouncer.record_fault(sensor_type);
                }
            }
        }

        if attempted > 0 && readings.is_empty() {
            bail!("all {} digital channels faulted this tick", attempted);
        }

        self.read_env_probe(&mut readings);
        self.capture_frame(&readings);

        for reading in readings {
            let triggered = self
                .debouncer
                .observe(reading.sensor_type, reading.value.is_positive());
            if !triggered {
                continue;
            }

            let sensor_type = reading.sensor_type;
            match self.coordinator.evaluate(sensor_type, Some(reading)) {
                Some(event) => {
                    MonitorStatus::incr(&self.status.alerts_fired);
                    if !self.dispatcher.enqueue(event) {
                        MonitorStatus::incr(&self.status.alerts_dropped);
                    }
                }
                None => MonitorStatus::incr(&self.status.alerts_suppressed),
            }
        }

        Ok(())
    }

    /// Environment thresholds run through the same debouncer as the
    /// digital channels: one hot sample is not an alert, N consecutive
    /// ones are.
    fn read_env_probe(&mut self, readings: &mut Vec<SensorReading>) {
        let Some(probe) = &self.env_probe else {
            return;
        };
        if !self.config.sensors.env_probe_enabled {
            return;
        }

        match probe.read() {
            Ok(env) => {
                let now = Utc::now();
                readings.push(SensorReading {
                    sensor_id: "env_temp".to_string(),
                    sensor_type: SensorType::Temperature,
                    timestamp: now,
                    value: ReadingValue::Number(
                        env.temperature_c - self.config.sensors.temp_threshold_high,
                    ),
                    raw_value: Some(ReadingValue::Number(env.temperature_c)),
                });
                readings.push(SensorReading {
                    sensor_id: "env_humidity".to_string(),
                    sensor_type: SensorType::Humidity,
                    timestamp: now,
                    value: ReadingValue::Number(
                        env.humidity_pct - self.config.sensors.humidity_threshold_high,
                    ),
                    raw_value: Some(ReadingValue::Number(env.humidity_pct)),
                });
                MonitorStatus::incr(&self.status.readings);
            }
            Err(e) => {
                warn!("Environment probe read failed: {}", e);
                MonitorStatus::incr(&self.status.sensor_faults);
                self.debouncer.record_fault(SensorType::Temperature);
                self.debouncer.record_fault(SensorType::Humidity);
            }
        }
    }

    /// Capture one frame into the rolling buffer, tagged with the
    /// channels currently reading positive. Capture failure costs this
    /// tick's frame and nothing else.
    fn capture_frame(&mut self, readings: &[SensorReading]) {
        let Some(camera) = &self.camera else {
            return;
        };
        if !self.config.camera.enabled {
            return;
        }

        let flags: Vec<SensorType> = readings
            .iter()
            .filter(|r| r.value.is_positive())
            .map(|r| r.sensor_type)
            .collect();

        match camera.capture_frame() {
            Ok(bytes) => self.frames.append(FrameEntry::new(bytes, flags)),
            Err(e) => {
                warn!("Frame capture failed: {}", e);
                MonitorStatus::incr(&self.status.capture_faults);
            }
        }
    }

    fn maybe_log_status(&self) {
        let every = self.config.monitor.status_log_every_ticks;
        if every == 0 {
            return;
        }
        let snap = self.status.snapshot();
        if snap.ticks % every == 0 {
            info!(
                "Status: {} ticks, {} readings, {} alerts fired, {} suppressed, {} dropped, \
                 {} delivery failures, {} sensor faults, {} capture faults, {} buffered frames",
                snap.ticks,
                snap.readings,
                snap.alerts_fired,
                snap.alerts_suppressed,
                snap.alerts_dropped,
                snap.deliveries_failed,
                snap.sensor_faults,
                snap.capture_faults,
                self.frames.len()
            );
        }
    }
}

fn digital_channels(config: &Config) -> [(SensorType, ChannelConfig); 3] {
    [
        (SensorType::Smoke, config.sensors.smoke.clone()),
        (SensorType::Flame, config.sensors.flame.clone()),
        (SensorType::Water, config.sensors.water.clone()),
    ]
}
