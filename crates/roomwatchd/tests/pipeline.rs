//! End-to-end pipeline test: sensor edge -> debounce -> cooldown ->
//! evidence archive -> delivery, with fake hardware and a fake clock.

use roomwatch_common::{EnvReading, MonitorError};
use roomwatchd::clock::FakeClock;
use roomwatchd::config::Config;
use roomwatchd::dispatcher::{AlertDispatcher, DispatcherConfig};
use roomwatchd::frame_buffer::FrameBuffer;
use roomwatchd::hardware::{Camera, EnvProbe, GpioReader, Mailer};
use roomwatchd::monitor::MonitorLoop;
use roomwatchd::status::MonitorStatus;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct ScriptedGpio {
    active: Mutex<HashMap<u8, bool>>,
}

impl ScriptedGpio {
    fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    fn set_active(&self, pin: u8, active: bool) {
        self.active.lock().unwrap().insert(pin, active);
    }
}

impl GpioReader for ScriptedGpio {
    fn read_pin(&self, pin: u8) -> Result<bool, MonitorError> {
        // active-low: hazard present reads LOW
        let active = *self.active.lock().unwrap().get(&pin).unwrap_or(&false);
        Ok(!active)
    }
}

struct CountingCamera {
    counter: Mutex<u8>,
}

impl Camera for CountingCamera {
    fn capture_frame(&self) -> Result<Vec<u8>, MonitorError> {
        let mut c = self.counter.lock().unwrap();
        *c += 1;
        Ok(vec![0xff, 0xd8, *c])
    }
}

struct QuietProbe;

impl EnvProbe for QuietProbe {
    fn read(&self) -> Result<EnvReading, MonitorError> {
        Ok(EnvReading {
            temperature_c: 21.0,
            humidity_pct: 45.0,
        })
    }
}

#[derive(Clone)]
struct Sent {
    subject: String,
    attachment_name: String,
    attachment: Vec<u8>,
}

struct CapturingMailer {
    sent: Mutex<Vec<Sent>>,
}

impl CapturingMailer {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for CapturingMailer {
    fn send(
        &self,
        _recipients: &[String],
        subject: &str,
        _body: &str,
        attachment_name: &str,
        attachment: &[u8],
    ) -> Result<(), MonitorError> {
        self.sent.lock().unwrap().push(Sent {
            subject: subject.to_string(),
            attachment_name: attachment_name.to_string(),
            attachment: attachment.to_vec(),
        });
        Ok(())
    }
}

struct Pipeline {
    monitor: MonitorLoop,
    gpio: Arc<ScriptedGpio>,
    clock: Arc<FakeClock>,
    mailer: Arc<CapturingMailer>,
    status: Arc<MonitorStatus>,
    dispatcher: AlertDispatcher,
    dispatcher_handle: tokio::task::JoinHandle<()>,
    capture_dir: std::path::PathBuf,
    _dir: TempDir,
}

fn pipeline() -> Pipeline {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.alerts.recipients = vec!["admin@example.edu".to_string()];
    config.alerts.capture_dir = dir.path().join("captures").display().to_string();
    config.alerts.delivery_audit_path = dir.path().join("deliveries.jsonl").display().to_string();
    config.alerts.retry_delay_secs = 0;
    let capture_dir = std::path::PathBuf::from(&config.alerts.capture_dir);

    let status = Arc::new(MonitorStatus::new());
    let mailer = Arc::new(CapturingMailer::new());
    let (dispatcher, dispatcher_handle) = AlertDispatcher::spawn(
        DispatcherConfig::from_config(&config.alerts),
        mailer.clone(),
        Arc::clone(&status),
    );

    let gpio = Arc::new(ScriptedGpio::new());
    let clock = Arc::new(FakeClock::new());
    let frames = Arc::new(FrameBuffer::new(config.camera.buffer_capacity));
    let monitor = MonitorLoop::new(
        config,
        clock.clone(),
        gpio.clone(),
        Some(Arc::new(CountingCamera {
            counter: Mutex::new(0),
        })),
        Some(Arc::new(QuietProbe)),
        frames,
        dispatcher.clone(),
        Arc::clone(&status),
    );

    Pipeline {
        monitor,
        gpio,
        clock,
        mailer,
        status,
        dispatcher,
        dispatcher_handle,
        capture_dir,
        _dir: dir,
    }
}

impl Pipeline {
    /// Run `n` ticks, advancing the fake clock by the poll interval
    /// between each as the real loop's cadence would.
    fn run_ticks(&mut self, n: u32) {
        for _ in 0..n {
            self.monitor.tick().unwrap();
            self.clock.advance(Duration::from_secs(5));
        }
    }

    async fn drain(
        self,
    ) -> (
        Arc<CapturingMailer>,
        Arc<MonitorStatus>,
        std::path::PathBuf,
        TempDir,
    ) {
        self.dispatcher.shutdown();
        self.dispatcher_handle.await.unwrap();
        (self.mailer, self.status, self.capture_dir, self._dir)
    }
}

#[tokio::test]
async fn test_smoke_edge_delivers_one_alert_with_evidence() {
    let mut p = pipeline();

    // a few idle ticks to build up evidence frames
    p.run_ticks(3);

    // smoke goes active; default threshold is 2 consecutive readings
    p.gpio.set_active(17, true);
    p.run_ticks(2);

    // still active for several more ticks: edge-triggered, one alert
    p.run_ticks(4);

    let (mailer, status, capture_dir, _dir) = p.drain().await;

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[WARNING] RoomWatch - SMOKE");
    assert!(sent[0].attachment_name.starts_with("SMOKE_"));
    assert!(sent[0].attachment_name.ends_with(".zip"));

    // 5 frames existed when the alert fired (3 idle + 2 active)
    let archive = zip::ZipArchive::new(Cursor::new(sent[0].attachment.clone())).unwrap();
    assert_eq!(archive.len(), 5);

    // the same archive is persisted on disk
    let on_disk: Vec<_> = std::fs::read_dir(&capture_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(on_disk.len(), 1);

    assert_eq!(status.snapshot().alerts_fired, 1);
    assert_eq!(status.snapshot().deliveries_failed, 0);
}

#[tokio::test]
async fn test_cooldown_suppresses_then_refires() {
    let mut p = pipeline();

    // first firing: 2 consecutive active readings
    p.gpio.set_active(17, true);
    p.run_ticks(2);

    // clear, then re-trigger within the 300 s cooldown
    p.gpio.set_active(17, false);
    p.run_ticks(1);
    p.gpio.set_active(17, true);
    p.run_ticks(2);
    assert_eq!(p.status.snapshot().alerts_fired, 1);
    assert_eq!(p.status.snapshot().alerts_suppressed, 1);

    // clear again and let the cooldown lapse
    p.gpio.set_active(17, false);
    p.run_ticks(1);
    p.clock.advance(Duration::from_secs(300));
    p.gpio.set_active(17, true);
    p.run_ticks(2);
    assert_eq!(p.status.snapshot().alerts_fired, 2);

    let (mailer, _, _, _dir) = p.drain().await;
    assert_eq!(mailer.sent().len(), 2);
}

#[tokio::test]
async fn test_channels_fire_independently() {
    let mut p = pipeline();

    // smoke (threshold 2) and water (threshold 1) both go active
    p.gpio.set_active(17, true);
    p.gpio.set_active(22, true);
    p.run_ticks(2);

    let (mailer, status, _, _dir) = p.drain().await;
    assert_eq!(status.snapshot().alerts_fired, 2);

    let subjects: Vec<String> = mailer.sent().iter().map(|s| s.subject.clone()).collect();
    assert!(subjects.contains(&"[WARNING] RoomWatch - SMOKE".to_string()));
    assert!(subjects.contains(&"[WARNING] RoomWatch - WATER".to_string()));
}

#[tokio::test]
async fn test_flame_needs_three_consecutive_readings() {
    let mut p = pipeline();

    // two active readings, a gap, then two more: never 3 in a row
    p.gpio.set_active(27, true);
    p.run_ticks(2);
    p.gpio.set_active(27, false);
    p.run_ticks(1);
    p.gpio.set_active(27, true);
    p.run_ticks(2);
    assert_eq!(p.status.snapshot().alerts_fired, 0);

    // third consecutive reading fires
    p.run_ticks(1);
    assert_eq!(p.status.snapshot().alerts_fired, 1);

    let (mailer, _, _, _dir) = p.drain().await;
    assert_eq!(mailer.sent()[0].subject, "[WARNING] RoomWatch - FLAME");
}
