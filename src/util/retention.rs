use std::collections::HashSet;

use chrono::{DateTime, Datelike, Local};

/// Configure retention of backup history.
///
/// Backups younger than [`days`](Self::days) are always kept. Older backups
/// survive only while they claim a free daily/weekly/monthly slot; if a slot
/// count is [None] every backup of that granularity is kept.
#[derive(Copy, Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct RetentionPolicy {
    /// Age window in days within which every backup is kept.
    pub days: Option<u32>,

    /// How many daily backups to keep beyond the age window.
    ///
    /// A daily backup is the newest backup of its day.
    pub daily: Option<usize>,

    /// How many weekly backups to keep beyond the age window.
    ///
    /// A weekly backup is the newest backup of its week.
    pub weekly: Option<usize>,

    /// How many monthly backups to keep beyond the age window.
    ///
    /// A monthly backup is the newest backup of its month.
    pub monthly: Option<usize>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days: Some(30),
            daily: Some(7),
            weekly: Some(4),
            monthly: Some(6),
        }
    }
}

/// Tracker applying a [RetentionPolicy] to one connection's history.
///
/// Feed backups newest first; the first backup seen in a day/week/month
/// bucket claims it.
#[derive(Clone, Debug)]
pub struct Retention {
    policy: RetentionPolicy,
    now: DateTime<Local>,
    daily: HashSet<(i32, u32)>,
    weekly: HashSet<(i32, u32)>,
    monthly: HashSet<(i32, u32)>,
}

impl Retention {
    pub fn new(policy: RetentionPolicy, now: DateTime<Local>) -> Self {
        Self {
            policy,
            now,
            daily: HashSet::new(),
            weekly: HashSet::new(),
            monthly: HashSet::new(),
        }
    }

    /// Returns whether a backup taken at `date` is to be retained.
    pub fn retain(&mut self, date: DateTime<Local>) -> bool {
        let Self {
            policy,
            now,
            daily,
            weekly,
            monthly,
        } = self;

        let within_window = policy.days.is_some_and(|days| {
            let age = now.signed_duration_since(date);
            age.num_days() < i64::from(days)
        });

        let new_daily = policy
            .daily
            .is_none_or(|keep_daily| daily.len() < keep_daily)
            && {
                let daily_key = (date.year(), date.ordinal());
                daily.insert(daily_key)
            };

        let new_weekly = policy
            .weekly
            .is_none_or(|keep_weekly| weekly.len() < keep_weekly)
            && {
                let weekly_key = (date.year(), date.iso_week().week());
                weekly.insert(weekly_key)
            };

        let new_monthly = policy
            .monthly
            .is_none_or(|keep_monthly| monthly.len() < keep_monthly)
            && {
                let monthly_key = (date.year(), date.month());
                monthly.insert(monthly_key)
            };

        within_window || new_daily || new_weekly || new_monthly
    }
}
