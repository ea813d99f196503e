//! Backup outcome notifications.
//!
//! Every notable outcome is appended as a [NotificationRecord] under
//! `<data root>/notifications/` (the feed a dashboard would show) and,
//! when a webhook URL is configured, posted as JSON to that URL. Delivery
//! failures are logged, never propagated into the backup result.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use derive_more::{Display, Error, From};
use uuid::Uuid;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BackupCompleted,
    BackupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[display("unread")]
    Unread,
    #[display("read")]
    Read,
}

/// One entry of the notification feed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Local>,
}

/// Which outcomes produce notifications, and where they go.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub on_success: bool,

    #[serde(default = "default_on_failure")]
    pub on_failure: bool,

    /// POST the notification metadata as JSON to this URL.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_on_failure() -> bool {
    true
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_success: false,
            on_failure: default_on_failure(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Display, Error, From)]
pub enum NotifyError {
    #[from]
    Io(io::Error),

    #[display("notification record is corrupt: {_0}")]
    #[from]
    CorruptRecord(serde_json::Error),
}

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes the notification feed and delivers webhooks.
#[derive(Debug, Clone)]
pub struct Notifier {
    dir: PathBuf,
    config: NotificationConfig,
}

impl Notifier {
    pub fn open(data_root: &Path, config: NotificationConfig) -> Result<Notifier, NotifyError> {
        let dir = data_root.join("notifications");
        fs::create_dir_all(&dir)?;
        Ok(Notifier { dir, config })
    }

    /// Record a successful backup, when enabled.
    pub fn backup_completed(&self, connection: &str, database: &str, size: u64) {
        if !self.config.on_success {
            return;
        }
        let metadata = serde_json::json!({
            "connection": connection,
            "database_name": database,
            "size": size,
            "timestamp": Local::now().to_rfc3339(),
        });
        self.publish(
            NotificationKind::BackupCompleted,
            "Backup Completed",
            format!("Backup completed for database '{database}'"),
            metadata,
        );
    }

    /// Record a failed backup, when enabled.
    pub fn backup_failed(&self, connection: &str, database: &str, error: &str) {
        if !self.config.on_failure {
            return;
        }
        let metadata = serde_json::json!({
            "connection": connection,
            "database_name": database,
            "error": error,
            "timestamp": Local::now().to_rfc3339(),
        });
        self.publish(
            NotificationKind::BackupFailed,
            "Backup Failed",
            format!("Backup failed for database '{database}': {error}"),
            metadata,
        );
    }

    fn publish(
        &self,
        kind: NotificationKind,
        title: &str,
        message: String,
        metadata: serde_json::Value,
    ) {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            message,
            kind,
            status: NotificationStatus::Unread,
            metadata: metadata.clone(),
            created_at: Local::now(),
        };

        if let Err(e) = self.append(&record) {
            log::error!(target: "notify", "Failed to record notification: {e}");
        }

        if let Some(url) = &self.config.webhook_url {
            self.post_webhook(url, &metadata);
        }
    }

    fn append(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        let path = self.dir.join(format!("{}.json", record.id));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn post_webhook(&self, url: &str, payload: &serde_json::Value) {
        let client = match reqwest::blocking::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                log::error!(target: "notify", "Failed to build webhook client: {e}");
                return;
            }
        };

        match client.post(url).json(payload).send() {
            Ok(response) if response.status().is_success() => {
                log::debug!(target: "notify", "Webhook delivered to {url}");
            }
            Ok(response) => {
                log::warn!(
                    target: "notify",
                    "Webhook to {url} answered {}",
                    response.status()
                );
            }
            Err(e) => {
                log::warn!(target: "notify", "Webhook to {url} failed: {e}");
            }
        }
    }

    /// The feed, newest first.
    pub fn list(&self) -> Result<Vec<NotificationRecord>, NotifyError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let raw = fs::read(entry.path())?;
            match serde_json::from_slice::<NotificationRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!(
                    target: "notify",
                    "Skipping corrupt notification {}: {e}",
                    entry.path().display()
                ),
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Mark every unread notification as read.
    pub fn mark_all_read(&self) -> Result<usize, NotifyError> {
        let mut updated = 0;
        for mut record in self.list()? {
            if record.status == NotificationStatus::Unread {
                record.status = NotificationStatus::Read;
                self.append(&record)?;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
