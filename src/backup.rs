//! Orchestration of backup runs, retention and dump comparison.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use derive_more::{Display, Error, From};
use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::backends::{self, DumpError, DumpTool};
use crate::connections::{ConnectionProfile, SshTunnel, SshTunnelError};
use crate::diff::{self, CompareError, CompareOptions, ComparisonResult};
use crate::notify::Notifier;
use crate::store::{read_dump_text, BackupRecord, BackupStatus, BackupStore, StoreError};
use crate::util::retention::{Retention, RetentionPolicy};

/// Errors of the backup service.
#[derive(Debug, Display, Error, From)]
pub enum BackupError {
    #[from]
    Dump(DumpError),

    #[from]
    Tunnel(SshTunnelError),

    #[from]
    Store(StoreError),

    #[from]
    Compare(CompareError),
}

/// Outcome of a retention pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruneReport {
    pub examined: usize,
    pub deleted: usize,
    pub freed_bytes: u64,
}

/// Stateless front of the backup operations; owns no locks, so clones may
/// run on worker threads concurrently.
#[derive(Debug, Clone)]
pub struct BackupService {
    store: BackupStore,
    notifier: Notifier,
    retention: RetentionPolicy,
    compare: CompareOptions,
    dry_run: bool,
}

impl BackupService {
    pub fn new(
        store: BackupStore,
        notifier: Notifier,
        retention: RetentionPolicy,
        compare: CompareOptions,
        dry_run: bool,
    ) -> BackupService {
        BackupService {
            store,
            notifier,
            retention,
            compare,
            dry_run,
        }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Back up one connection now.
    ///
    /// On a dry run the dump command still executes so connectivity and
    /// credentials are exercised, but its output is discarded and no record
    /// is written.
    pub fn run_backup(
        &self,
        profile: &ConnectionProfile,
        schedule: Option<&str>,
    ) -> Result<BackupRecord, BackupError> {
        log::info!(
            target: "backup",
            "Create dump of {} database '{}' on {}:{}",
            profile.kind,
            profile.database,
            profile.host,
            profile.port()
        );

        match self.run_backup_inner(profile, schedule) {
            Ok(record) => {
                if !self.dry_run {
                    self.notifier
                        .backup_completed(&profile.name, &profile.database, record.size);
                }
                Ok(record)
            }
            Err(e) => {
                if !self.dry_run {
                    self.notifier
                        .backup_failed(&profile.name, &profile.database, &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run_backup_inner(
        &self,
        profile: &ConnectionProfile,
        schedule: Option<&str>,
    ) -> Result<BackupRecord, BackupError> {
        let backend = backends::backend_for(profile.kind);
        backends::resolve_tool(backend.tool())?;

        // Tunnel first so the dump command talks to the forwarded endpoint.
        let tunnel = match &profile.ssh {
            Some(ssh) => Some(SshTunnel::open(ssh, &profile.host, profile.port())?),
            None => None,
        };
        let (host, port) = match &tunnel {
            Some(tunnel) => (tunnel.local_host().to_string(), tunnel.local_port()),
            None => (profile.host.clone(), profile.port()),
        };

        let timestamp = Local::now().format("%Y-%m-%dT%H-%M-%S");
        let dump_path = self.store.dumps_dir().join(format!(
            "{}_{timestamp}.{}.gz",
            profile.database,
            backend.extension()
        ));
        log::debug!(target: "backup", "Save dump at: {}", dump_path.display());

        let mut record = BackupRecord {
            id: Uuid::new_v4(),
            connection: profile.name.clone(),
            schedule: schedule.map(str::to_string),
            status: BackupStatus::Running,
            path: dump_path.clone(),
            size: 0,
            started_time: Local::now(),
            completed_time: None,
            message: None,
        };
        if !self.dry_run {
            self.store.save(&record)?;
        }

        match self.execute_dump(backend, profile, &host, port, &dump_path) {
            Ok(size) => {
                record.size = size;
                record.status = BackupStatus::Completed;
                record.completed_time = Some(Local::now());
                if !self.dry_run {
                    self.store.save(&record)?;
                }
                log::info!(
                    target: "backup",
                    "Finished dump of '{}' ({size} bytes compressed)",
                    profile.database
                );
                Ok(record)
            }
            Err(e) => {
                record.status = BackupStatus::Failed;
                record.message = Some(e.to_string());
                if !self.dry_run {
                    self.store.save(&record)?;
                    // No partial artifacts next to a failed record.
                    if dump_path.is_file() {
                        if let Err(cleanup) = fs::remove_file(&dump_path) {
                            log::warn!(
                                target: "backup",
                                "Failed to remove partial dump {}: {cleanup}",
                                dump_path.display()
                            );
                        }
                    }
                }
                Err(e.into())
            }
        }
    }

    fn execute_dump(
        &self,
        backend: &dyn DumpTool,
        profile: &ConnectionProfile,
        host: &str,
        port: u16,
        dump_path: &Path,
    ) -> Result<u64, DumpError> {
        if self.dry_run {
            log::trace!(target: "backup", "Discarding dump output on dry-run");
            let mut sink = io::sink();
            backends::dump_to_writer(backend, profile, host, port, &mut sink)?;
            return Ok(0);
        }

        let dump_file = File::create_new(dump_path)?;
        let mut encoder = GzEncoder::new(dump_file, Compression::default());
        backends::dump_to_writer(backend, profile, host, port, &mut encoder)?;
        let mut dump_file = encoder.finish()?;
        dump_file.flush()?;
        Ok(dump_file.metadata()?.len())
    }

    /// Compare two backups line by line.
    ///
    /// Each argument is a backup id from the history or a path to a dump
    /// file; `.gz` artifacts are decompressed before comparison.
    pub fn compare_backups(
        &self,
        source: &str,
        target: &str,
    ) -> Result<ComparisonResult, BackupError> {
        let source_text = self.resolve_dump(source)?;
        let target_text = self.resolve_dump(target)?;
        Ok(diff::compare(&source_text, &target_text, &self.compare)?)
    }

    fn resolve_dump(&self, reference: &str) -> Result<String, BackupError> {
        if let Ok(id) = Uuid::parse_str(reference) {
            return Ok(self.store.artifact_text(id)?);
        }

        let path = Path::new(reference);
        if path.is_file() {
            return Ok(read_dump_text(path)?);
        }

        Err(StoreError::NotFound {
            id: reference.to_string(),
        }
        .into())
    }

    /// Apply retention to one connection's history.
    pub fn apply_retention(
        &self,
        connection: &str,
        policy: Option<RetentionPolicy>,
    ) -> Result<PruneReport, BackupError> {
        let policy = policy.unwrap_or(self.retention);
        let now = Local::now();
        let mut tracker = Retention::new(policy, now);
        let mut report = PruneReport::default();

        // Newest first, so fresh backups claim the retention slots.
        for record in self.store.list_for_connection(connection)? {
            report.examined += 1;

            let keep = match record.status {
                BackupStatus::Completed => tracker.retain(record.started_time),
                // Failed and stale in-flight records only survive the age window.
                _ => policy.days.is_none_or(|days| {
                    now.signed_duration_since(record.started_time).num_days() < i64::from(days)
                }),
            };
            if keep {
                continue;
            }

            report.deleted += 1;
            report.freed_bytes += record.size;
            if self.dry_run {
                log::info!(
                    target: "backup",
                    "Would delete backup {} of {} from {}",
                    record.id,
                    record.connection,
                    record.started_time
                );
            } else {
                log::info!(
                    target: "backup",
                    "Deleting backup {} of {} from {}",
                    record.id,
                    record.connection,
                    record.started_time
                );
                self.store.delete(&record)?;
            }
        }

        Ok(report)
    }

    /// Apply retention to every connection present in the history.
    pub fn apply_retention_all(&self) -> Result<PruneReport, BackupError> {
        let mut connections: Vec<String> = self
            .store
            .list()?
            .into_iter()
            .map(|record| record.connection)
            .collect();
        connections.sort();
        connections.dedup();

        let mut total = PruneReport::default();
        for connection in connections {
            let report = self.apply_retention(&connection, None)?;
            total.examined += report.examined;
            total.deleted += report.deleted;
            total.freed_bytes += report.freed_bytes;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationConfig;
    use chrono::Duration;

    fn service(dir: &Path, dry_run: bool) -> BackupService {
        let store = BackupStore::open(dir).unwrap();
        let notifier = Notifier::open(dir, NotificationConfig::default()).unwrap();
        BackupService::new(
            store,
            notifier,
            RetentionPolicy::default(),
            CompareOptions::default(),
            dry_run,
        )
    }

    fn completed_record(connection: &str, days_old: i64) -> BackupRecord {
        let started = Local::now() - Duration::days(days_old);
        BackupRecord {
            id: Uuid::new_v4(),
            connection: connection.to_string(),
            schedule: None,
            status: BackupStatus::Completed,
            path: std::path::PathBuf::from("/nonexistent"),
            size: 100,
            started_time: started,
            completed_time: Some(started + Duration::seconds(5)),
            message: None,
        }
    }

    #[test]
    fn compare_resolves_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), false);

        let a = dir.path().join("a.sql");
        let b = dir.path().join("b.sql");
        fs::write(&a, "line1\nline2\n").unwrap();
        fs::write(&b, "line1\nline2\nline3\n").unwrap();

        let result = service
            .compare_backups(a.to_str().unwrap(), b.to_str().unwrap())
            .unwrap();
        assert_eq!(result.summary.added, 1);
        assert_eq!(result.summary.unchanged, 2);
    }

    #[test]
    fn compare_resolves_recorded_backups_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), false);

        let dump = service.store().dumps_dir().join("orders.sql");
        fs::write(&dump, "a\nb\n").unwrap();
        let mut record = completed_record("orders", 0);
        record.path = dump;
        service.store().save(&record).unwrap();

        let other = dir.path().join("other.sql");
        fs::write(&other, "a\nx\n").unwrap();

        let result = service
            .compare_backups(&record.id.to_string(), other.to_str().unwrap())
            .unwrap();
        assert_eq!(result.summary.modified, 1);
        assert_eq!(result.summary.unchanged, 1);
    }

    #[test]
    fn compare_reports_missing_references() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), false);

        let err = service
            .compare_backups("no-such-backup", "also-missing")
            .unwrap_err();
        assert!(matches!(
            err,
            BackupError::Store(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn retention_prunes_old_history() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), false);

        // Policy without ladder slots: everything outside the window goes.
        let policy = RetentionPolicy {
            days: Some(30),
            daily: Some(0),
            weekly: Some(0),
            monthly: Some(0),
        };

        service.store().save(&completed_record("orders", 1)).unwrap();
        service.store().save(&completed_record("orders", 10)).unwrap();
        service.store().save(&completed_record("orders", 90)).unwrap();

        let report = service.apply_retention("orders", Some(policy)).unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.freed_bytes, 100);
        assert_eq!(service.store().list_for_connection("orders").unwrap().len(), 2);
    }

    #[test]
    fn dry_run_retention_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), true);

        let policy = RetentionPolicy {
            days: Some(30),
            daily: Some(0),
            weekly: Some(0),
            monthly: Some(0),
        };
        service.store().save(&completed_record("orders", 90)).unwrap();

        let report = service.apply_retention("orders", Some(policy)).unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(service.store().list_for_connection("orders").unwrap().len(), 1);
    }

    #[test]
    fn retention_all_covers_every_connection() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), false);

        let policy = RetentionPolicy {
            days: Some(30),
            daily: Some(0),
            weekly: Some(0),
            monthly: Some(0),
        };
        let service = BackupService::new(
            service.store().clone(),
            Notifier::open(dir.path(), NotificationConfig::default()).unwrap(),
            policy,
            CompareOptions::default(),
            false,
        );

        service.store().save(&completed_record("orders", 90)).unwrap();
        service.store().save(&completed_record("shop", 90)).unwrap();
        service.store().save(&completed_record("shop", 1)).unwrap();

        let report = service.apply_retention_all().unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.deleted, 2);
    }
}
