//! Persistence of backup history.
//!
//! Every backup run leaves one [BackupRecord], stored as a JSON document
//! under `<data root>/records/`. The dump artifacts themselves live under
//! `<data root>/dumps/`. The store also resolves a backup id back to its
//! dump text for comparison, gunzipping `.gz` artifacts transparently.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use derive_more::{Display, Error, From};
use flate2::read::GzDecoder;
use uuid::Uuid;

/// Lifecycle of a backup run, as shown in the history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    #[display("pending")]
    Pending,
    #[display("running")]
    Running,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

/// One backup run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub connection: String,

    /// Name of the schedule that triggered the run; `None` for manual runs.
    #[serde(default)]
    pub schedule: Option<String>,

    pub status: BackupStatus,
    pub path: PathBuf,
    pub size: u64,
    pub started_time: DateTime<Local>,

    #[serde(default)]
    pub completed_time: Option<DateTime<Local>>,

    /// Failure detail for [BackupStatus::Failed] records.
    #[serde(default)]
    pub message: Option<String>,
}

impl BackupRecord {
    pub fn duration_seconds(&self) -> Option<f64> {
        let completed = self.completed_time?;
        let millis = completed
            .signed_duration_since(self.started_time)
            .num_milliseconds();
        Some(millis as f64 / 1000.0)
    }
}

/// Aggregate history statistics.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackupStats {
    pub total_backups: usize,
    pub total_size: u64,
    pub average_size: u64,
    pub average_duration: f64,
    pub success_rate: f64,
    pub last_backup_time: Option<DateTime<Local>>,
}

/// Errors of the history store.
#[derive(Debug, Display, Error, From)]
pub enum StoreError {
    #[from]
    Io(io::Error),

    /// A record on disk is not valid JSON.
    #[display("backup record is corrupt: {_0}")]
    #[from]
    CorruptRecord(serde_json::Error),

    /// The referenced backup does not exist.
    #[display("backup {id} not found")]
    NotFound { id: String },

    /// The referenced artifact is not decodable as text.
    #[display("artifact {} is not decodable as text", path.display())]
    NotText { path: PathBuf },
}

/// History store rooted at the data directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    records_dir: PathBuf,
    dumps_dir: PathBuf,
}

impl BackupStore {
    /// Open (and create if needed) the store below `data_root`.
    pub fn open(data_root: &Path) -> Result<BackupStore, StoreError> {
        let records_dir = data_root.join("records");
        let dumps_dir = data_root.join("dumps");
        fs::create_dir_all(&records_dir)?;
        fs::create_dir_all(&dumps_dir)?;
        Ok(BackupStore {
            records_dir,
            dumps_dir,
        })
    }

    pub fn dumps_dir(&self) -> &Path {
        &self.dumps_dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.records_dir.join(format!("{id}.json"))
    }

    /// Persist a record, overwriting any previous state of the same run.
    pub fn save(&self, record: &BackupRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;
        log::trace!(target: "store", "Saved backup record {}", record.id);
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<BackupRecord, StoreError> {
        let path = self.record_path(id);
        if !path.is_file() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        let raw = fs::read(&path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<BackupRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.records_dir)? {
            let entry = entry?;
            if entry.path().extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let raw = fs::read(entry.path())?;
            match serde_json::from_slice::<BackupRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!(
                        target: "store",
                        "Skipping corrupt backup record {}: {e}",
                        entry.path().display()
                    );
                }
            }
        }
        records.sort_by(|a, b| b.started_time.cmp(&a.started_time));
        Ok(records)
    }

    /// Records of one connection, newest first.
    pub fn list_for_connection(&self, connection: &str) -> Result<Vec<BackupRecord>, StoreError> {
        let mut records = self.list()?;
        records.retain(|r| r.connection == connection);
        Ok(records)
    }

    /// Delete a record and its artifact.
    pub fn delete(&self, record: &BackupRecord) -> Result<(), StoreError> {
        if record.path.is_file() {
            fs::remove_file(&record.path)?;
        }
        let record_path = self.record_path(record.id);
        if record_path.is_file() {
            fs::remove_file(&record_path)?;
        }
        Ok(())
    }

    /// Aggregate statistics over the whole history.
    pub fn stats(&self) -> Result<BackupStats, StoreError> {
        let records = self.list()?;
        let mut stats = BackupStats {
            total_backups: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(stats);
        }

        let mut completed = 0usize;
        let mut duration_sum = 0f64;
        let mut durations = 0usize;
        for record in &records {
            stats.total_size += record.size;
            if record.status == BackupStatus::Completed {
                completed += 1;
            }
            if let Some(seconds) = record.duration_seconds() {
                duration_sum += seconds;
                durations += 1;
            }
        }

        stats.average_size = stats.total_size / records.len() as u64;
        stats.success_rate = completed as f64 / records.len() as f64;
        if durations > 0 {
            stats.average_duration = duration_sum / durations as f64;
        }
        stats.last_backup_time = records.first().map(|r| r.started_time);
        Ok(stats)
    }

    /// Resolve a backup id to the text content of its artifact.
    ///
    /// `.gz` artifacts are decompressed on the fly. Artifacts that do not
    /// decode as UTF-8 (for example mongodump archives) are rejected as
    /// [StoreError::NotText] rather than compared as garbage.
    pub fn artifact_text(&self, id: Uuid) -> Result<String, StoreError> {
        let record = self.load(id)?;
        if !record.path.is_file() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        read_dump_text(&record.path)
    }
}

/// Read a dump file as text, decompressing `.gz` transparently.
pub fn read_dump_text(path: &Path) -> Result<String, StoreError> {
    let file = File::open(path)?;
    let mut content = String::new();

    let gzipped = path.extension().is_some_and(|ext| ext == "gz");
    let outcome = if gzipped {
        GzDecoder::new(file).read_to_string(&mut content)
    } else {
        let mut file = file;
        file.read_to_string(&mut content)
    };

    match outcome {
        Ok(_) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(StoreError::NotText {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}
