//! Alert dispatch - bounded queue, background delivery worker.
//!
//! The monitor loop enqueues without blocking; a single worker pulls
//! alerts in FIFO order, packages evidence into a zip archive,
//! persists it under the capture directory, and mails it with a
//! bounded retry budget. One stuck alert never stalls the queue beyond
//! its own retries. A sentinel message drains the queue and stops the
//! worker cleanly.

use crate::hardware::Mailer;
use crate::status::MonitorStatus;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use roomwatch_common::{AlertEvent, DeliveryOutcome, DeliveryRecord, MonitorError};
use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// How many terminal records are kept in memory for inspection.
const RECENT_RECORDS: usize = 100;

/// Queue message: an alert to deliver, or the shutdown sentinel.
enum DispatchMsg {
    Alert(AlertEvent),
    Shutdown,
}

/// Dispatcher settings, lifted from the alert section of the config.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub recipients: Vec<String>,
    /// Total delivery attempts per alert.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Cap on a single delivery attempt; a mailer that exceeds it
    /// counts as a failed attempt.
    pub send_timeout: Duration,
    pub queue_capacity: usize,
    pub capture_dir: PathBuf,
    pub audit_path: PathBuf,
}

impl DispatcherConfig {
    pub fn from_config(alerts: &crate::config::AlertConfig) -> Self {
        Self {
            recipients: alerts.recipients.clone(),
            max_retries: alerts.max_retries.max(1),
            retry_delay: Duration::from_secs(alerts.retry_delay_secs),
            send_timeout: Duration::from_secs(alerts.send_timeout_secs.max(1)),
            queue_capacity: alerts.queue_capacity.max(1),
            capture_dir: PathBuf::from(&alerts.capture_dir),
            audit_path: PathBuf::from(&alerts.delivery_audit_path),
        }
    }
}

/// Append-only delivery audit: JSONL on disk plus a bounded in-memory
/// tail for observability.
pub struct DeliveryLog {
    path: PathBuf,
    recent: Mutex<VecDeque<DeliveryRecord>>,
}

impl DeliveryLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_RECORDS)),
        }
    }

    pub fn append(&self, record: DeliveryRecord) {
        if let Err(e) = self.write_line(&record) {
            warn!(
                "Failed to write delivery record to {}: {}",
                self.path.display(),
                e
            );
        }

        let mut recent = self.recent.lock().unwrap();
        if recent.len() == RECENT_RECORDS {
            recent.pop_front();
        }
        recent.push_back(record);
    }

    fn write_line(&self, record: &DeliveryRecord) -> Result<(), MonitorError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    pub fn recent(&self) -> Vec<DeliveryRecord> {
        self.recent.lock().unwrap().iter().cloned().collect()
    }
}

/// Producer-side handle to the dispatcher. Cloning shares the same
/// queue and delivery log.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<DispatchMsg>,
    log: Arc<DeliveryLog>,
}

impl AlertDispatcher {
    /// Spawn the delivery worker and return the enqueue handle plus
    /// the worker's join handle for a bounded drain on shutdown.
    pub fn spawn(
        config: DispatcherConfig,
        mailer: Arc<dyn Mailer>,
        status: Arc<MonitorStatus>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let log = Arc::new(DeliveryLog::new(config.audit_path.clone()));

        let worker = Worker {
            rx,
            config,
            mailer,
            status,
            log: Arc::clone(&log),
        };

        let handle = tokio::spawn(worker.run());

        (Self { tx, log }, handle)
    }

    /// Non-blocking enqueue. A full queue drops the alert: liveness of
    /// the sampling loop beats guaranteed delivery of every alert.
    pub fn enqueue(&self, event: AlertEvent) -> bool {
        match self.tx.try_send(DispatchMsg::Alert(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(DispatchMsg::Alert(event))) => {
                warn!(
                    "Alert queue full, dropping {} alert (correlation {})",
                    event.event_type, event.correlation_id
                );
                self.log
                    .append(DeliveryRecord::new(&event, 0, DeliveryOutcome::Dropped, None));
                false
            }
            Err(_) => {
                warn!("Alert queue closed, dropping alert");
                false
            }
        }
    }

    /// Signal shutdown without ever blocking: try to push the
    /// sentinel, then drop this sender. Alerts already enqueued are
    /// still delivered; once the queue drains the worker's `recv`
    /// terminates even if the sentinel never fit. The caller bounds
    /// the drain by awaiting the worker handle under a timeout.
    pub fn shutdown(self) {
        if let Err(mpsc::error::TrySendError::Full(_)) =
            self.tx.try_send(DispatchMsg::Shutdown)
        {
            warn!("Alert queue full at shutdown; draining without sentinel");
        }
    }

    /// Recent terminal delivery records, oldest first.
    pub fn recent_records(&self) -> Vec<DeliveryRecord> {
        self.log.recent()
    }
}

struct Worker {
    rx: mpsc::Receiver<DispatchMsg>,
    config: DispatcherConfig,
    mailer: Arc<dyn Mailer>,
    status: Arc<MonitorStatus>,
    log: Arc<DeliveryLog>,
}

impl Worker {
    async fn run(mut self) {
        info!("Alert dispatcher worker started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                DispatchMsg::Alert(event) => self.deliver(event).await,
                DispatchMsg::Shutdown => {
                    // The sentinel sits behind any queued alerts, so
                    // everything enqueued before it is already done.
                    info!("Alert dispatcher received shutdown sentinel");
                    break;
                }
            }
        }

        info!("Alert dispatcher worker stopped");
    }

    /// Deliver one alert: archive, persist, mail with retry. Every
    /// terminal outcome lands in the delivery log.
    async fn deliver(&self, event: AlertEvent) {
        let archive_name = archive_name(&event);

        let archive = match build_archive(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Failed to package evidence for {} alert: {}",
                    event.event_type, e
                );
                MonitorStatus::incr(&self.status.deliveries_failed);
                self.log.append(DeliveryRecord::new(
                    &event,
                    0,
                    DeliveryOutcome::Failed,
                    Some(e.to_string()),
                ));
                return;
            }
        };

        if let Err(e) = self.persist_archive(&archive_name, &archive) {
            // Disk trouble should not stop the mail from going out.
            warn!("Failed to persist archive {}: {}", archive_name, e);
        }

        let mut last_error: Option<MonitorError> = None;
        for attempt in 1..=self.config.max_retries {
            let outcome = tokio::time::timeout(
                self.config.send_timeout,
                self.send_blocking(&event, &archive_name, &archive),
            )
            .await
            .unwrap_or_else(|_| {
                Err(MonitorError::DeliveryFault(format!(
                    "send timed out after {:?}",
                    self.config.send_timeout
                )))
            });

            match outcome {
                Ok(()) => {
                    info!(
                        "Alert delivered: {} (attempt {}/{}, correlation {})",
                        event.event_type, attempt, self.config.max_retries, event.correlation_id
                    );
                    self.log.append(DeliveryRecord::new(
                        &event,
                        attempt,
                        DeliveryOutcome::Delivered,
                        None,
                    ));
                    return;
                }
                Err(e) => {
                    warn!(
                        "Delivery attempt {}/{} failed for {} alert: {}",
                        attempt, self.config.max_retries, event.event_type, e
                    );
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        error!(
            "Alert delivery failed permanently: {} (correlation {})",
            event.event_type, event.correlation_id
        );
        MonitorStatus::incr(&self.status.deliveries_failed);
        self.log.append(DeliveryRecord::new(
            &event,
            self.config.max_retries,
            DeliveryOutcome::Failed,
            last_error.map(|e| e.to_string()),
        ));
    }

    fn persist_archive(&self, name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.config.capture_dir)
            .context("Failed to create capture directory")?;
        let path = self.config.capture_dir.join(name);
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write archive {}", path.display()))?;
        Ok(())
    }

    /// The mailer is synchronous by contract; run it on the blocking
    /// pool so retries and sleeps stay on the async side.
    async fn send_blocking(
        &self,
        event: &AlertEvent,
        archive_name: &str,
        archive: &[u8],
    ) -> Result<(), MonitorError> {
        let mailer = Arc::clone(&self.mailer);
        let recipients = self.config.recipients.clone();
        let subject = event.subject.clone();
        let body = event.message.clone();
        let name = archive_name.to_string();
        let bytes = archive.to_vec();

        tokio::task::spawn_blocking(move || {
            mailer.send(&recipients, &subject, &body, &name, &bytes)
        })
        .await
        .map_err(|e| MonitorError::DeliveryFault(format!("mailer task panicked: {}", e)))?
    }
}

/// `{EVENT_TYPE}_{ISO8601}.zip`, e.g. `SMOKE_2026-08-29T10:00:00Z.zip`.
pub fn archive_name(event: &AlertEvent) -> String {
    format!(
        "{}_{}.zip",
        event.event_type.label(),
        event
            .created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Package the evidence frames into a deflate-compressed zip, oldest
/// frame first, one JPEG per entry.
pub fn build_archive(event: &AlertEvent) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (i, frame) in event.evidence.iter().enumerate() {
        let entry_name = format!(
            "{}_{:03}_{}.jpg",
            event.event_type.label(),
            i + 1,
            frame.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        writer
            .start_file(entry_name, options)
            .context("Failed to start archive entry")?;
        writer
            .write_all(&frame.image)
            .context("Failed to write frame into archive")?;
    }

    let cursor = writer.finish().context("Failed to finalize archive")?;
    Ok(cursor.into_inner())
}
