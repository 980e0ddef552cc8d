//! Capture storage lifecycle - age and size retention for archives.
//!
//! The capture directory grows forever unless something prunes it. A
//! background task runs a cleanup pass on a fixed interval: first an
//! age policy removes anything older than the retention window, then a
//! size policy removes the oldest remaining files until usage drops
//! back under a target fraction of the budget. Files touched within a
//! short grace window are never deleted, so an archive the dispatcher
//! is still writing cannot be reaped mid-write.

use anyhow::Result;
use roomwatch_common::MonitorError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// After the size policy fires, usage is reduced to this fraction of
/// the budget rather than just under it, so the policy does not fire
/// again on the very next archive.
const SIZE_TARGET_FRACTION: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct StoragePolicy {
    pub root: PathBuf,
    pub max_age: Duration,
    pub max_total_bytes: u64,
    /// Files modified more recently than this are never deleted.
    pub grace: Duration,
}

impl StoragePolicy {
    pub fn from_config(storage: &crate::config::StorageConfig, root: PathBuf) -> Self {
        Self {
            root,
            max_age: Duration::from_secs(storage.max_age_days * 24 * 3600),
            max_total_bytes: storage.max_total_bytes,
            grace: Duration::from_secs(storage.grace_secs),
        }
    }
}

/// What one cleanup pass did.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanupReport {
    pub files_deleted: u64,
    pub bytes_freed: u64,
    pub dirs_pruned: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DirectoryInfo {
    pub total_bytes: u64,
    pub file_count: u64,
    /// Age of the oldest file, in seconds.
    pub oldest_secs: Option<u64>,
    /// Age of the newest file, in seconds.
    pub newest_secs: Option<u64>,
}

struct FileInfo {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

pub struct StorageLifecycleManager {
    policy: StoragePolicy,
}

impl StorageLifecycleManager {
    pub fn new(policy: StoragePolicy) -> Self {
        Self { policy }
    }

    /// Run cleanup passes until the shutdown signal flips. The first
    /// pass runs immediately so a restart after a long outage reclaims
    /// space right away.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Storage lifecycle manager started for {} (budget {} bytes, max age {:?})",
            self.policy.root.display(),
            self.policy.max_total_bytes,
            self.policy.max_age
        );

        loop {
            match self.cleanup_pass() {
                Ok(report) if report.files_deleted > 0 || report.dirs_pruned > 0 => {
                    info!(
                        "Cleanup pass: {} files deleted, {} bytes freed, {} empty dirs pruned",
                        report.files_deleted, report.bytes_freed, report.dirs_pruned
                    );
                }
                Ok(_) => debug!("Cleanup pass: nothing to do"),
                Err(e) => warn!("Cleanup pass failed: {}", e),
            }

            let info = self.directory_info();
            info!(
                "Capture storage: {} files, {} bytes used of {}",
                info.file_count, info.total_bytes, self.policy.max_total_bytes
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Storage lifecycle manager stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One full pass: age policy, then size policy, then empty-dir
    /// pruning. Per-file failures are logged and skipped; one
    /// undeletable file never aborts the pass.
    pub fn cleanup_pass(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        if !self.policy.root.exists() {
            return Ok(report);
        }

        let now = SystemTime::now();
        let mut files = self.scan_files();

        // Age policy first: anything past retention goes regardless of
        // how much space is in use.
        files.retain(|f| {
            if self.in_grace(f, now) {
                return true;
            }
            let age = now.duration_since(f.modified).unwrap_or_default();
            if age > self.policy.max_age {
                if self.delete_file(f, &mut report) {
                    return false;
                }
            }
            true
        });

        // Size policy: oldest-first until usage is back under the
        // target fraction of the budget.
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        if total > self.policy.max_total_bytes {
            let target = (self.policy.max_total_bytes as f64 * SIZE_TARGET_FRACTION) as u64;
            files.sort_by_key(|f| f.modified);
            for f in &files {
                if total <= target {
                    break;
                }
                if self.in_grace(f, now) {
                    continue;
                }
                if self.delete_file(f, &mut report) {
                    total = total.saturating_sub(f.size);
                }
            }
        }

        report.dirs_pruned = self.prune_empty_dirs();
        Ok(report)
    }

    /// Current usage of the capture tree.
    pub fn directory_info(&self) -> DirectoryInfo {
        let files = self.scan_files();
        let now = SystemTime::now();
        let age = |t: SystemTime| now.duration_since(t).unwrap_or_default().as_secs();
        DirectoryInfo {
            total_bytes: files.iter().map(|f| f.size).sum(),
            file_count: files.len() as u64,
            oldest_secs: files.iter().map(|f| age(f.modified)).max(),
            newest_secs: files.iter().map(|f| age(f.modified)).min(),
        }
    }

    fn scan_files(&self) -> Vec<FileInfo> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.policy.root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(FileInfo {
                path: entry.path().to_path_buf(),
                size: meta.len(),
                modified,
            });
        }
        files
    }

    fn in_grace(&self, file: &FileInfo, now: SystemTime) -> bool {
        now.duration_since(file.modified)
            .map(|age| age < self.policy.grace)
            .unwrap_or(true) // mtime in the future counts as freshly written
    }

    /// Returns true when the file is actually gone.
    fn delete_file(&self, file: &FileInfo, report: &mut CleanupReport) -> bool {
        match fs::remove_file(&file.path) {
            Ok(()) => {
                debug!("Deleted {}", file.path.display());
                report.files_deleted += 1;
                report.bytes_freed += file.size;
                true
            }
            Err(e) => {
                let fault = MonitorError::StorageFault {
                    path: file.path.display().to_string(),
                    reason: e.to_string(),
                };
                warn!("{}", fault);
                false
            }
        }
    }

    /// Remove empty subdirectories, deepest first. The root itself
    /// stays.
    fn prune_empty_dirs(&self) -> u64 {
        let mut dirs: Vec<PathBuf> = WalkDir::new(&self.policy.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.path().to_path_buf())
            .collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

        let mut pruned = 0;
        for dir in dirs {
            if dir_is_empty(&dir) {
                match fs::remove_dir(&dir) {
                    Ok(()) => pruned += 1,
                    Err(e) => warn!("Failed to prune {}: {}", dir.display(), e),
                }
            }
        }
        pruned
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn policy(root: &Path, max_age: Duration, budget: u64, grace: Duration) -> StoragePolicy {
        StoragePolicy {
            root: root.to_path_buf(),
            max_age,
            max_total_bytes: budget,
            grace,
        }
    }

    fn write_file(path: &Path, size: usize) {
        let mut f = File::create(path).unwrap();
        f.write_all(&vec![0u8; size]).unwrap();
    }

    fn backdate(path: &Path, age: Duration) {
        let f = fs::OpenOptions::new().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_age_policy_deletes_expired_files() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("SMOKE_old.zip");
        let fresh = dir.path().join("SMOKE_fresh.zip");
        write_file(&old, 10);
        write_file(&fresh, 10);
        backdate(&old, Duration::from_secs(10 * 24 * 3600));

        let mgr = StorageLifecycleManager::new(policy(
            dir.path(),
            Duration::from_secs(7 * 24 * 3600),
            u64::MAX,
            Duration::from_secs(5),
        ));
        let report = mgr.cleanup_pass().unwrap();

        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.bytes_freed, 10);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_size_policy_deletes_oldest_first_to_target() {
        let dir = TempDir::new().unwrap();
        // 4 files of 100 bytes against a 250-byte budget; target is
        // 200, so the two oldest must go.
        for (name, age_days) in [("a.zip", 4u64), ("b.zip", 3), ("c.zip", 2), ("d.zip", 1)] {
            let p = dir.path().join(name);
            write_file(&p, 100);
            backdate(&p, Duration::from_secs(age_days * 24 * 3600));
        }

        let mgr = StorageLifecycleManager::new(policy(
            dir.path(),
            Duration::from_secs(30 * 24 * 3600),
            250,
            Duration::from_secs(5),
        ));
        let report = mgr.cleanup_pass().unwrap();

        assert_eq!(report.files_deleted, 2);
        assert!(!dir.path().join("a.zip").exists());
        assert!(!dir.path().join("b.zip").exists());
        assert!(dir.path().join("c.zip").exists());
        assert!(dir.path().join("d.zip").exists());
    }

    #[test]
    fn test_grace_window_protects_fresh_files() {
        let dir = TempDir::new().unwrap();
        // freshly written and over budget, but inside the grace window
        write_file(&dir.path().join("new.zip"), 1000);

        let mgr = StorageLifecycleManager::new(policy(
            dir.path(),
            Duration::from_secs(0),
            100,
            Duration::from_secs(3600),
        ));
        let report = mgr.cleanup_pass().unwrap();

        assert_eq!(report.files_deleted, 0);
        assert!(dir.path().join("new.zip").exists());
    }

    #[test]
    fn test_empty_directories_are_pruned_root_survives() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("2026").join("08");
        fs::create_dir_all(&nested).unwrap();

        let mgr = StorageLifecycleManager::new(policy(
            dir.path(),
            Duration::from_secs(3600),
            u64::MAX,
            Duration::from_secs(5),
        ));
        let report = mgr.cleanup_pass().unwrap();

        assert_eq!(report.dirs_pruned, 2);
        assert!(!dir.path().join("2026").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_missing_root_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("does-not-exist");
        let mgr = StorageLifecycleManager::new(policy(
            &gone,
            Duration::from_secs(3600),
            100,
            Duration::from_secs(5),
        ));
        let report = mgr.cleanup_pass().unwrap();
        assert_eq!(report.files_deleted, 0);
    }

    #[test]
    fn test_directory_info_counts_nested_files() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir_all(&sub).unwrap();
        write_file(&dir.path().join("a.zip"), 50);
        write_file(&sub.join("b.zip"), 70);

        let mgr = StorageLifecycleManager::new(policy(
            dir.path(),
            Duration::from_secs(3600),
            u64::MAX,
            Duration::from_secs(5),
        ));
        let info = mgr.directory_info();
        assert_eq!(info.file_count, 2);
        assert_eq!(info.total_bytes, 120);
        assert!(info.oldest_secs.is_some());
        assert!(info.newest_secs.unwrap() <= info.oldest_secs.unwrap());
    }
}
