//! Hardware collaborator interfaces.
//!
//! Raw drivers and SMTP mechanics live outside this crate; everything
//! the pipeline needs is expressed as a small synchronous trait, and
//! the composition root decides which implementation to inject. Tests
//! substitute fakes. The production implementations here are thin:
//! a sysfs pin read, a shell-out capture command, a hwmon file probe,
//! and a mailx pipe.

use roomwatch_common::{EnvReading, MonitorError};
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Digital sensor pin access. Fails closed: callers treat a fault as
/// "no hazard" and count it.
pub trait GpioReader: Send + Sync {
    /// Raw pin level, true = HIGH. Polarity correction is the
    /// caller's job (the wiring knows, this trait does not).
    fn read_pin(&self, pin: u8) -> Result<bool, MonitorError>;
}

/// Single-shot JPEG capture.
pub trait Camera: Send + Sync {
    fn capture_frame(&self) -> Result<Vec<u8>, MonitorError>;
}

/// Temperature/humidity probe.
pub trait EnvProbe: Send + Sync {
    fn read(&self) -> Result<EnvReading, MonitorError>;
}

/// Outbound mail. Synchronous by contract; the dispatcher calls it
/// from a blocking task so mail I/O never stalls the runtime.
pub trait Mailer: Send + Sync {
    fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
        attachment_name: &str,
        attachment: &[u8],
    ) -> Result<(), MonitorError>;
}

/// GPIO reader backed by the sysfs GPIO interface.
pub struct SysfsGpio {
    base: PathBuf,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self {
            base: PathBuf::from("/sys/class/gpio"),
        }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioReader for SysfsGpio {
    fn read_pin(&self, pin: u8) -> Result<bool, MonitorError> {
        let path = self.base.join(format!("gpio{}/value", pin));
        let content = fs::read_to_string(&path).map_err(|e| MonitorError::SensorFault {
            pin,
            reason: format!("{}: {}", path.display(), e),
        })?;

        match content.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(MonitorError::SensorFault {
                pin,
                reason: format!("unexpected pin value {:?}", other),
            }),
        }
    }
}

/// Poll-wait on a child process, killing it once the deadline passes.
/// Returns None when the child had to be killed.
fn wait_bounded(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Camera that shells out to an external capture command (raspistill
/// or compatible) writing one JPEG to stdout. The child is killed
/// once the deadline passes, so a wedged capture tool costs one
/// frame, never the sampling cadence.
pub struct CommandCamera {
    cmd: String,
    timeout: Duration,
}

impl CommandCamera {
    pub fn new(cmd: String, timeout: Duration) -> Self {
        Self { cmd, timeout }
    }
}

impl Camera for CommandCamera {
    fn capture_frame(&self) -> Result<Vec<u8>, MonitorError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MonitorError::CaptureFault(format!("spawn failed: {}", e)))?;

        // Frames can exceed the pipe buffer; read stdout on its own
        // thread so the bounded wait below cannot deadlock against a
        // writer blocked on a full pipe.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MonitorError::CaptureFault("no stdout handle".to_string()))?;
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let status = wait_bounded(&mut child, self.timeout)
            .map_err(|e| MonitorError::CaptureFault(format!("wait: {}", e)))?;

        let Some(status) = status else {
            return Err(MonitorError::CaptureFault(format!(
                "capture command timed out after {:?}",
                self.timeout
            )));
        };

        let bytes = reader
            .join()
            .map_err(|_| MonitorError::CaptureFault("stdout reader panicked".to_string()))?
            .map_err(|e| MonitorError::CaptureFault(format!("read frame: {}", e)))?;

        if !status.success() {
            return Err(MonitorError::CaptureFault(format!(
                "capture command exited with {}",
                status
            )));
        }

        if bytes.is_empty() {
            return Err(MonitorError::CaptureFault("empty frame".to_string()));
        }

        debug!("Captured frame ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

/// Environment probe reading hwmon-style value files (milli-units).
pub struct HwmonEnvProbe {
    temp_path: PathBuf,
    humidity_path: PathBuf,
}

impl HwmonEnvProbe {
    pub fn new(temp_path: PathBuf, humidity_path: PathBuf) -> Self {
        Self {
            temp_path,
            humidity_path,
        }
    }

    fn read_milli(path: &PathBuf) -> Result<f64, MonitorError> {
        let content = fs::read_to_string(path).map_err(|e| {
            MonitorError::CaptureFault(format!("env probe {}: {}", path.display(), e))
        })?;
        let raw: f64 = content.trim().parse().map_err(|e| {
            MonitorError::CaptureFault(format!("env probe {}: {}", path.display(), e))
        })?;
        Ok(raw / 1000.0)
    }
}

impl EnvProbe for HwmonEnvProbe {
    fn read(&self) -> Result<EnvReading, MonitorError> {
        Ok(EnvReading {
            temperature_c: Self::read_milli(&self.temp_path)?,
            humidity_pct: Self::read_milli(&self.humidity_path)?,
        })
    }
}

/// Mailer that pipes the body to a mailx-compatible binary with the
/// archive attached from a temp file. SMTP configuration belongs to
/// the mail tool, not to this daemon. A hung mail tool is killed at
/// the deadline and reported as a delivery fault.
pub struct MailxMailer {
    binary: String,
    timeout: Duration,
}

impl MailxMailer {
    pub fn new(binary: String, timeout: Duration) -> Self {
        Self { binary, timeout }
    }
}

impl Mailer for MailxMailer {
    fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
        attachment_name: &str,
        attachment: &[u8],
    ) -> Result<(), MonitorError> {
        if recipients.is_empty() {
            return Err(MonitorError::DeliveryFault(
                "no recipients configured".to_string(),
            ));
        }

        // mailx takes attachments by path; stage the bytes in a
        // uniquely-named temp file and remove it afterwards.
        let tmp = std::env::temp_dir().join(format!("roomwatch-{}-{}", Uuid::new_v4(), attachment_name));
        fs::write(&tmp, attachment)
            .map_err(|e| MonitorError::DeliveryFault(format!("staging attachment: {}", e)))?;

        let result = (|| {
            let mut child = Command::new(&self.binary)
                .arg("-s")
                .arg(subject)
                .arg("-A")
                .arg(&tmp)
                .args(recipients)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| MonitorError::DeliveryFault(format!("spawn {}: {}", self.binary, e)))?;

            if let Some(stdin) = child.stdin.as_mut() {
                stdin
                    .write_all(body.as_bytes())
                    .map_err(|e| MonitorError::DeliveryFault(format!("write body: {}", e)))?;
            }
            drop(child.stdin.take());

            let status = wait_bounded(&mut child, self.timeout)
                .map_err(|e| MonitorError::DeliveryFault(format!("wait: {}", e)))?;

            let Some(status) = status else {
                return Err(MonitorError::DeliveryFault(format!(
                    "{} timed out after {:?}",
                    self.binary, self.timeout
                )));
            };

            if !status.success() {
                return Err(MonitorError::DeliveryFault(format!(
                    "{} exited with {}",
                    self.binary, status
                )));
            }

            Ok(())
        })();

        let _ = fs::remove_file(&tmp);
        result
    }
}
