//! RoomWatch Daemon - hazard monitor for server rooms
//!
//! Samples smoke, flame and water channels, keeps a rolling camera
//! buffer, and mails evidence archives when a hazard is confirmed.

use anyhow::{Context, Result};
use roomwatchd::clock::SystemClock;
use roomwatchd::config::Config;
use roomwatchd::dispatcher::{AlertDispatcher, DispatcherConfig};
use roomwatchd::frame_buffer::FrameBuffer;
use roomwatchd::hardware::{
    Camera, CommandCamera, EnvProbe, GpioReader, HwmonEnvProbe, MailxMailer, SysfsGpio,
};
use roomwatchd::monitor::MonitorLoop;
use roomwatchd::status::MonitorStatus;
use roomwatchd::storage::{StorageLifecycleManager, StoragePolicy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// How long shutdown waits for the dispatcher to drain queued alerts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("RoomWatch daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("Failed to load configuration")?;
    if config.alerts.recipients.is_empty() {
        warn!("No alert recipients configured; alerts will fail delivery");
    }

    let status = Arc::new(MonitorStatus::new());
    let frames = Arc::new(FrameBuffer::new(config.camera.buffer_capacity));

    let gpio: Arc<dyn GpioReader> = Arc::new(SysfsGpio::new());
    let camera: Option<Arc<dyn Camera>> = if config.camera.enabled {
        Some(Arc::new(CommandCamera::new(
            config.camera.capture_cmd.clone(),
            Duration::from_secs(config.camera.capture_timeout_secs.max(1)),
        )))
    } else {
        None
    };
    let env_probe: Option<Arc<dyn EnvProbe>> = if config.sensors.env_probe_enabled {
        Some(Arc::new(HwmonEnvProbe::new(
            PathBuf::from("/sys/class/hwmon/hwmon0/temp1_input"),
            PathBuf::from("/sys/class/hwmon/hwmon0/humidity1_input"),
        )))
    } else {
        None
    };

    let (dispatcher, dispatcher_handle) = AlertDispatcher::spawn(
        DispatcherConfig::from_config(&config.alerts),
        Arc::new(MailxMailer::new(
            "mailx".to_string(),
            Duration::from_secs(config.alerts.send_timeout_secs.max(1)),
        )),
        Arc::clone(&status),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let storage = StorageLifecycleManager::new(StoragePolicy::from_config(
        &config.storage,
        PathBuf::from(&config.alerts.capture_dir),
    ));
    let storage_handle = tokio::spawn(storage.run(
        Duration::from_secs(config.storage.cleanup_interval_secs.max(1)),
        shutdown_rx.clone(),
    ));

    let monitor = MonitorLoop::new(
        config,
        Arc::new(SystemClock::new()),
        gpio,
        camera,
        env_probe,
        frames,
        dispatcher.clone(),
        Arc::clone(&status),
    );
    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    info!("RoomWatch daemon ready");

    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");

    // Stop producers first, then drain the dispatcher.
    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    let _ = storage_handle.await;

    // shutdown() never blocks, so the grace period below bounds the
    // whole remaining drain
    dispatcher.shutdown();
    match tokio::time::timeout(DRAIN_TIMEOUT, dispatcher_handle).await {
        Ok(_) => info!("Alert queue drained"),
        Err(_) => warn!("Alert queue did not drain within {:?}", DRAIN_TIMEOUT),
    }

    let snap = status.snapshot();
    info!(
        "RoomWatch daemon stopped after {} ticks, {} alerts fired",
        snap.ticks, snap.alerts_fired
    );
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }
    Ok(())
}
