//! Configuration management for roomwatchd.
//!
//! Loads settings from /etc/roomwatch/config.toml or uses defaults.
//! Every field has a serde default, so a partial file is fine and a
//! missing file falls back to a fully-defaulted config.

use anyhow::{Context, Result};
use roomwatch_common::SensorType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/roomwatch/config.toml";

/// Monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Target sampling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Fixed backoff after a failed tick, in seconds
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Log a status line every N ticks
    #[serde(default = "default_status_every")]
    pub status_log_every_ticks: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_error_backoff() -> u64 {
    5
}

fn default_status_every() -> u64 {
    100
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            error_backoff_secs: default_error_backoff(),
            status_log_every_ticks: default_status_every(),
        }
    }
}

/// One digital hazard channel: GPIO pin plus debounce threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub pin: u8,

    /// Consecutive positive readings required before the channel is
    /// considered triggered.
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Active-low wiring: the pin reads LOW when the hazard is
    /// present. True for the reference MQ-2/flame/water boards.
    #[serde(default = "default_true")]
    pub inverted: bool,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> u32 {
    2
}

/// Sensor configuration. Pin numbers and thresholds follow the
/// reference wiring: MQ-2 smoke on 17, flame on 27, water on 22.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_smoke")]
    pub smoke: ChannelConfig,

    #[serde(default = "default_flame")]
    pub flame: ChannelConfig,

    #[serde(default = "default_water")]
    pub water: ChannelConfig,

    /// Environment probe (temperature/humidity) enabled
    #[serde(default = "default_true")]
    pub env_probe_enabled: bool,

    /// Alert when temperature rises above this (deg C)
    #[serde(default = "default_temp_high")]
    pub temp_threshold_high: f64,

    /// Alert when relative humidity rises above this (%)
    #[serde(default = "default_humidity_high")]
    pub humidity_threshold_high: f64,

    /// Debounce threshold for the numeric channels
    #[serde(default = "default_threshold")]
    pub env_threshold: u32,
}

fn default_smoke() -> ChannelConfig {
    ChannelConfig {
        enabled: true,
        pin: 17,
        threshold: 2,
        inverted: true,
    }
}

fn default_flame() -> ChannelConfig {
    ChannelConfig {
        enabled: true,
        pin: 27,
        threshold: 3,
        inverted: true,
    }
}

fn default_water() -> ChannelConfig {
    ChannelConfig {
        enabled: true,
        pin: 22,
        threshold: 1,
        inverted: true,
    }
}

fn default_temp_high() -> f64 {
    35.0
}

fn default_humidity_high() -> f64 {
    80.0
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            smoke: default_smoke(),
            flame: default_flame(),
            water: default_water(),
            env_probe_enabled: true,
            temp_threshold_high: default_temp_high(),
            humidity_threshold_high: default_humidity_high(),
            env_threshold: default_threshold(),
        }
    }
}

impl SensorConfig {
    /// Debounce threshold for a channel, used when wiring the
    /// debouncer at startup.
    pub fn threshold_for(&self, sensor_type: SensorType) -> u32 {
        match sensor_type {
            SensorType::Smoke => self.smoke.threshold,
            SensorType::Flame => self.flame.threshold,
            SensorType::Water => self.water.threshold,
            SensorType::Temperature | SensorType::Humidity => self.env_threshold,
        }
    }
}

/// Frame buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rolling evidence buffer capacity (frames)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// External capture command producing one JPEG on stdout
    #[serde(default = "default_capture_cmd")]
    pub capture_cmd: String,

    /// Kill the capture command after this many seconds
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,
}

fn default_buffer_capacity() -> usize {
    15
}

fn default_capture_cmd() -> String {
    "raspistill -n -t 200 -w 320 -h 240 -q 75 -o -".to_string()
}

fn default_capture_timeout() -> u64 {
    10
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_capacity: default_buffer_capacity(),
            capture_cmd: default_capture_cmd(),
            capture_timeout_secs: default_capture_timeout(),
        }
    }
}

/// Alert delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Alert recipients (email addresses)
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Minimum seconds between two alerts of the same type
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Bounded alert queue capacity; a full queue drops new alerts
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delivery attempts per alert before it is recorded as failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between delivery attempts, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Cap on a single delivery attempt, in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Directory where evidence archives are persisted
    #[serde(default = "default_capture_dir")]
    pub capture_dir: String,

    /// Append-only JSONL delivery audit file
    #[serde(default = "default_audit_path")]
    pub delivery_audit_path: String,

    /// Location line included in alert bodies
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_cooldown() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_send_timeout() -> u64 {
    30
}

fn default_capture_dir() -> String {
    "/var/lib/roomwatch/captures".to_string()
}

fn default_audit_path() -> String {
    "/var/log/roomwatch/deliveries.jsonl".to_string()
}

fn default_location() -> String {
    "Server room".to_string()
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            cooldown_secs: default_cooldown(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            send_timeout_secs: default_send_timeout(),
            capture_dir: default_capture_dir(),
            delivery_audit_path: default_audit_path(),
            location: default_location(),
        }
    }
}

/// Storage budget for the capture directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Delete files older than this many days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,

    /// Total capture directory budget in bytes
    #[serde(default = "default_max_bytes")]
    pub max_total_bytes: u64,

    /// Never touch files modified within this many seconds
    #[serde(default = "default_grace")]
    pub grace_secs: u64,

    /// Seconds between cleanup passes
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_max_age_days() -> u64 {
    7
}

fn default_max_bytes() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_grace() -> u64 {
    5
}

fn default_cleanup_interval() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_total_bytes: default_max_bytes(),
            grace_secs: default_grace(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            roomwatch_common::MonitorError::Config(format!("{}: {}", path.display(), e))
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
