use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Path to the velld configuration file.
    #[arg(long, env = "VELLD_CONFIG", default_value = "velld.toml")]
    pub config: PathBuf,

    /// Folder for dump artifacts, history records and notifications.
    #[arg(long, short = 'r', env = "VELLD_DATA_ROOT", default_value = "velld-data")]
    pub data_root: PathBuf,

    /// Simulative run: dumps are exercised but nothing is written or deleted.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Back up one registered connection now.
    Backup(BackupArgs),

    /// Run the schedule loop.
    Schedule(ScheduleArgs),

    /// Compare two backups line by line and print the result as JSON.
    Compare(CompareArgs),

    /// List recorded backups, newest first.
    History(HistoryArgs),

    /// Show aggregate statistics over the backup history.
    Stats,

    /// Apply the retention policy to the backup history.
    Prune(PruneArgs),

    /// Show the notification feed.
    Notifications(NotificationArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Name of the connection to back up.
    pub connection: String,
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Process due schedules once and exit instead of looping.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Backup id or dump file used as the base of the comparison.
    pub source: String,

    /// Backup id or dump file compared against the base.
    pub target: String,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only show backups of this connection.
    #[arg(long)]
    pub connection: Option<String>,

    /// Maximum number of entries to show.
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Only prune backups of this connection.
    #[arg(long)]
    pub connection: Option<String>,
}

#[derive(Args, Debug)]
pub struct NotificationArgs {
    /// Mark every unread notification as read after listing.
    #[arg(long)]
    pub mark_read: bool,
}
