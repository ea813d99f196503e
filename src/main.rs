use std::process::exit;

use clap::Parser;

use velld_lib::backup::BackupService;
use velld_lib::cli::{
    Action, BackupArgs, Cli, CompareArgs, HistoryArgs, NotificationArgs, PruneArgs, ScheduleArgs,
};
use velld_lib::config::VelldConfig;
use velld_lib::connections::find_profile;
use velld_lib::notify::Notifier;
use velld_lib::schedule::Scheduler;
use velld_lib::store::BackupStore;

fn main() {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    env_logger.try_init().expect("env_logger should not fail");

    let config: VelldConfig = match std::fs::read_to_string(&cli.config) {
        Ok(config_str) => match toml::from_str(&config_str) {
            Err(e) => {
                log::error!("Reading the config file failed: {e}");
                exit(1);
            }
            Ok(cfg) => cfg,
        },
        Err(e) => {
            if std::fs::exists(&cli.config).is_ok_and(|b| !b) {
                log::debug!(
                    "Writing default config to {} because it doesn't exist yet",
                    cli.config.display()
                );
                let default_config = VelldConfig::default();
                let config_str = toml::to_string_pretty(&default_config)
                    .expect("default config should be serializable");
                if let Err(e) = std::fs::write(&cli.config, config_str) {
                    log::warn!(
                        "Writing default config to {} failed {e}",
                        cli.config.display(),
                    );
                }

                default_config
            } else {
                log::error!("Reading the config file failed: {e}");
                exit(1);
            }
        }
    };

    let dry_run = cli.dry_run;
    if dry_run {
        log::warn!("Running in dry-run mode");
    }

    let store = match BackupStore::open(&cli.data_root) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Opening the data root {} failed: {e}", cli.data_root.display());
            exit(1);
        }
    };
    let notifier = match Notifier::open(&cli.data_root, config.notifications.clone()) {
        Ok(notifier) => notifier,
        Err(e) => {
            log::error!("Opening the notification feed failed: {e}");
            exit(1);
        }
    };
    let service = BackupService::new(
        store,
        notifier.clone(),
        config.retention,
        config.compare,
        dry_run,
    );

    match cli.action {
        Action::Backup(BackupArgs { connection }) => {
            let Some(profile) = find_profile(&config.connections, &connection) else {
                log::error!("Connection {connection} is not configured");
                exit(1);
            };
            match service.run_backup(profile, None) {
                Ok(record) => {
                    println!("{} {} {}", record.id, record.status, record.path.display());
                }
                Err(e) => {
                    log::error!(target: "backup", "Backup of {connection} resulted in a fatal error: {e}");
                    exit(1);
                }
            }
        }

        Action::Schedule(ScheduleArgs { once }) => {
            let scheduler = Scheduler::new(
                &service,
                &config.connections,
                &config.schedules,
                &cli.data_root,
            );
            let result = if once {
                scheduler.check().and_then(|()| scheduler.tick())
            } else {
                scheduler.run()
            };
            if let Err(e) = result {
                log::error!(target: "schedule", "Scheduler failed: {e}");
                exit(1);
            }
        }

        Action::Compare(CompareArgs {
            source,
            target,
            pretty,
        }) => match service.compare_backups(&source, &target) {
            Ok(result) => {
                let json = if pretty {
                    serde_json::to_string_pretty(&result)
                } else {
                    serde_json::to_string(&result)
                }
                .expect("comparison result should be serializable");
                println!("{json}");
            }
            Err(e) => {
                log::error!(target: "diff", "Comparing the backups failed: {e}");
                exit(1);
            }
        },

        Action::History(HistoryArgs { connection, limit }) => {
            let records = match &connection {
                Some(name) => service.store().list_for_connection(name),
                None => service.store().list(),
            };
            match records {
                Ok(records) => {
                    for record in records.iter().take(limit) {
                        println!(
                            "{} {:<9} {:<16} {:>10} {}",
                            record.started_time.format("%Y-%m-%d %H:%M:%S"),
                            record.status,
                            record.connection,
                            human_size(record.size),
                            record.id,
                        );
                    }
                }
                Err(e) => {
                    log::error!(target: "store", "Listing the backup history failed: {e}");
                    exit(1);
                }
            }
        }

        Action::Stats => match service.store().stats() {
            Ok(stats) => {
                println!("total backups:    {}", stats.total_backups);
                println!("total size:       {}", human_size(stats.total_size));
                println!("average size:     {}", human_size(stats.average_size));
                println!("average duration: {:.1}s", stats.average_duration);
                println!("success rate:     {:.0}%", stats.success_rate * 100.0);
                match stats.last_backup_time {
                    Some(last) => println!("last backup:      {}", last.format("%Y-%m-%d %H:%M:%S")),
                    None => println!("last backup:      never"),
                }
            }
            Err(e) => {
                log::error!(target: "store", "Computing backup statistics failed: {e}");
                exit(1);
            }
        },

        Action::Prune(PruneArgs { connection }) => {
            let report = match &connection {
                Some(name) => service.apply_retention(name, None),
                None => service.apply_retention_all(),
            };
            match report {
                Ok(report) => {
                    let verb = if dry_run { "would delete" } else { "deleted" };
                    println!(
                        "examined {} backup(s), {verb} {} ({})",
                        report.examined,
                        report.deleted,
                        human_size(report.freed_bytes)
                    );
                }
                Err(e) => {
                    log::error!(target: "backup", "Applying the retention policy failed: {e}");
                    exit(1);
                }
            }
        }

        Action::Notifications(NotificationArgs { mark_read }) => {
            match notifier.list() {
                Ok(feed) => {
                    for record in &feed {
                        println!(
                            "{} [{}] {}: {}",
                            record.created_at.format("%Y-%m-%d %H:%M:%S"),
                            record.status,
                            record.title,
                            record.message,
                        );
                    }
                }
                Err(e) => {
                    log::error!(target: "notify", "Listing notifications failed: {e}");
                    exit(1);
                }
            }
            if mark_read {
                match notifier.mark_all_read() {
                    Ok(updated) => log::info!(target: "notify", "Marked {updated} notification(s) as read"),
                    Err(e) => {
                        log::error!(target: "notify", "Marking notifications as read failed: {e}");
                        exit(1);
                    }
                }
            }
        }
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
