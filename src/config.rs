//! The velld configuration file.
//!
//! One TOML document describes the registered connections, the schedules
//! and the ambient policies. A missing file is bootstrapped with defaults
//! on first start.

use crate::connections::ConnectionProfile;
use crate::diff::CompareOptions;
use crate::notify::NotificationConfig;
use crate::schedule::ScheduleConfig;
use crate::util::retention::RetentionPolicy;

/// Everything the TOML config file can carry.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct VelldConfig {
    /// Registered database connections.
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionProfile>,

    /// Recurring backup schedules.
    #[serde(default, rename = "schedule")]
    pub schedules: Vec<ScheduleConfig>,

    /// Retention applied by `prune` and after scheduled runs.
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Notification toggles and webhook target.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Limits of the dump comparison.
    #[serde(default)]
    pub compare: CompareOptions,
}
