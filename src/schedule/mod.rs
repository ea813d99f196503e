//! Recurring backup schedules.
//!
//! A schedule couples a connection with a [Frequency] and an optional
//! retention override. Frequencies are a closed enum with a derived
//! human-readable label, not cron expressions. Next/last run times are
//! persisted under the data root so missed runs are caught up after a
//! restart.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Days, Duration, Local, Months, Timelike};
use derive_more::{Display, Error, From};

use crate::backup::BackupService;
use crate::connections::{find_profile, ConnectionProfile};
use crate::util::retention::RetentionPolicy;

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// At the top of every hour.
    Hourly,
    /// Every day at midnight.
    Daily,
    /// Every Monday at midnight.
    Weekly,
    /// On the first of every month at midnight.
    Monthly,
    /// Every N minutes, for intervals the fixed variants can't express.
    EveryMinutes(u32),
}

impl Frequency {
    /// Human-readable label shown next to a schedule.
    pub fn label(&self) -> String {
        match self {
            Frequency::Hourly => "hourly".to_string(),
            Frequency::Daily => "daily".to_string(),
            Frequency::Weekly => "weekly".to_string(),
            Frequency::Monthly => "monthly".to_string(),
            Frequency::EveryMinutes(1) => "every minute".to_string(),
            Frequency::EveryMinutes(minutes) => format!("every {minutes} minutes"),
        }
    }

    /// The first fire time strictly after `after`.
    ///
    /// Returns [None] for a zero-minute interval or when the computed local
    /// time does not exist (DST gap).
    pub fn next_run(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        match *self {
            Frequency::Hourly => (after + Duration::hours(1))
                .with_minute(0)?
                .with_second(0)?
                .with_nanosecond(0),
            Frequency::Daily => at_midnight(after.date_naive().checked_add_days(Days::new(1))?),
            Frequency::Weekly => {
                let days_until_monday = 7 - u64::from(after.weekday().num_days_from_monday());
                at_midnight(
                    after
                        .date_naive()
                        .checked_add_days(Days::new(days_until_monday))?,
                )
            }
            Frequency::Monthly => at_midnight(
                after
                    .date_naive()
                    .checked_add_months(Months::new(1))?
                    .with_day(1)?,
            ),
            Frequency::EveryMinutes(0) => None,
            Frequency::EveryMinutes(minutes) => (after + Duration::minutes(i64::from(minutes)))
                .with_second(0)?
                .with_nanosecond(0),
        }
    }
}

fn at_midnight(date: chrono::NaiveDate) -> Option<DateTime<Local>> {
    date.and_hms_opt(0, 0, 0)?.and_local_timezone(Local).single()
}

/// One configured schedule.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScheduleConfig {
    /// Unique name; schedule state is keyed by it.
    pub name: String,

    /// Name of the connection to back up.
    pub connection: String,

    pub frequency: Frequency,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Retention applied to the connection after each run; falls back to
    /// the global policy when unset.
    #[serde(default)]
    pub retention: Option<RetentionPolicy>,
}

fn default_enabled() -> bool {
    true
}

/// Persisted run times of one schedule.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScheduleEntry {
    pub next_run_time: Option<DateTime<Local>>,
    pub last_backup_time: Option<DateTime<Local>>,
}

/// Run-time state of all schedules, keyed by schedule name.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScheduleState {
    #[serde(default)]
    entries: HashMap<String, ScheduleEntry>,
}

impl ScheduleState {
    pub fn load(path: &Path) -> Result<ScheduleState, ScheduleError> {
        if !path.is_file() {
            return Ok(ScheduleState::default());
        }
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ScheduleError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn entry(&self, name: &str) -> ScheduleEntry {
        self.entries.get(name).cloned().unwrap_or_default()
    }

    pub fn update(&mut self, name: &str, entry: ScheduleEntry) {
        self.entries.insert(name.to_string(), entry);
    }
}

#[derive(Debug, Display, Error, From)]
pub enum ScheduleError {
    #[from]
    Io(io::Error),

    /// The state file on disk is not valid JSON.
    #[display("schedule state is corrupt: {_0}")]
    #[from]
    CorruptState(serde_json::Error),

    /// A schedule references a connection that is not configured.
    #[display("schedule {schedule} references unknown connection {connection}")]
    UnknownConnection { schedule: String, connection: String },

    /// A schedule's frequency can never fire.
    #[display("schedule {schedule} has a frequency that never fires")]
    NeverFires { schedule: String },
}

/// Ticking scheduler over the configured schedules.
pub struct Scheduler<'a> {
    service: &'a BackupService,
    profiles: &'a [ConnectionProfile],
    schedules: &'a [ScheduleConfig],
    state_path: PathBuf,
}

const IDLE_TICK: StdDuration = StdDuration::from_secs(60);

impl<'a> Scheduler<'a> {
    pub fn new(
        service: &'a BackupService,
        profiles: &'a [ConnectionProfile],
        schedules: &'a [ScheduleConfig],
        data_root: &Path,
    ) -> Scheduler<'a> {
        Scheduler {
            service,
            profiles,
            schedules,
            state_path: data_root.join("schedule-state.json"),
        }
    }

    /// Validate schedules against the configured connections.
    pub fn check(&self) -> Result<(), ScheduleError> {
        for schedule in self.schedules {
            if find_profile(self.profiles, &schedule.connection).is_none() {
                return Err(ScheduleError::UnknownConnection {
                    schedule: schedule.name.clone(),
                    connection: schedule.connection.clone(),
                });
            }
            if schedule.frequency.next_run(Local::now()).is_none() {
                return Err(ScheduleError::NeverFires {
                    schedule: schedule.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run every due schedule once and persist the new state.
    ///
    /// On the first pass after a restart a persisted next-run time in the
    /// past counts as due, so missed runs are caught up immediately.
    pub fn tick(&self) -> Result<(), ScheduleError> {
        let mut state = ScheduleState::load(&self.state_path)?;
        let now = Local::now();

        let mut workers = Vec::new();
        for schedule in self.schedules.iter().filter(|s| s.enabled) {
            let mut entry = state.entry(&schedule.name);

            match entry.next_run_time {
                // First sighting of this schedule: arm it, don't fire.
                None => {
                    entry.next_run_time = schedule.frequency.next_run(now);
                    log::debug!(
                        target: "schedule",
                        "Armed schedule {} for {:?}",
                        schedule.name,
                        entry.next_run_time
                    );
                }
                Some(next_run) if next_run <= now => {
                    if next_run + Duration::minutes(5) < now {
                        log::warn!(
                            target: "schedule",
                            "Schedule {} missed its run at {next_run}, catching up now",
                            schedule.name
                        );
                    }
                    entry.last_backup_time = Some(now);
                    entry.next_run_time = schedule.frequency.next_run(now);
                    workers.push(self.spawn_backup(schedule));
                }
                // Armed for later; leave the fire point untouched.
                Some(_) => {}
            }

            state.update(&schedule.name, entry);
        }

        state.save(&self.state_path)?;

        for (schedule, worker) in workers {
            match worker.join() {
                Ok(Ok(record)) => {
                    log::info!(
                        target: "schedule",
                        "Scheduled backup {} for {} finished",
                        record.id,
                        schedule
                    );
                }
                Ok(Err(e)) => {
                    log::error!(
                        target: "schedule",
                        "Scheduled backup for {schedule} resulted in a fatal error: {e}"
                    );
                }
                Err(_) => {
                    log::error!(target: "schedule", "Backup worker for {schedule} panicked");
                }
            }
        }

        Ok(())
    }

    fn spawn_backup(
        &self,
        schedule: &ScheduleConfig,
    ) -> (
        String,
        thread::JoinHandle<Result<crate::store::BackupRecord, crate::backup::BackupError>>,
    ) {
        log::info!(
            target: "schedule",
            "Schedule {} ({}) is due, backing up {}",
            schedule.name,
            schedule.frequency.label(),
            schedule.connection
        );

        let service = self.service.clone();
        let schedule = schedule.clone();
        let profile = find_profile(self.profiles, &schedule.connection)
            .expect("schedules are checked against the profiles")
            .clone();

        let name = schedule.name.clone();
        let handle = thread::spawn(move || {
            let record = service.run_backup(&profile, Some(&schedule.name))?;
            service.apply_retention(&profile.name, schedule.retention)?;
            Ok(record)
        });
        (name, handle)
    }

    /// Tick forever, sleeping until the nearest armed schedule.
    pub fn run(&self) -> Result<(), ScheduleError> {
        self.check()?;
        log::info!(
            target: "schedule",
            "Scheduler running with {} schedule(s)",
            self.schedules.iter().filter(|s| s.enabled).count()
        );

        loop {
            self.tick()?;

            let state = ScheduleState::load(&self.state_path)?;
            let now = Local::now();
            let nearest = self
                .schedules
                .iter()
                .filter(|s| s.enabled)
                .filter_map(|s| state.entry(&s.name).next_run_time)
                .min();

            let sleep = match nearest {
                Some(next) if next > now => (next - now)
                    .to_std()
                    .unwrap_or(IDLE_TICK)
                    .min(IDLE_TICK),
                _ => IDLE_TICK,
            };
            log::trace!(target: "schedule", "Sleeping {}s", sleep.as_secs());
            thread::sleep(sleep);
        }
    }
}
