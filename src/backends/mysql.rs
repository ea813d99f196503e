//! MySQL and MariaDB dumps via `mysqldump`.

use std::path::Path;
use std::process::Command;

use crate::backends::DumpTool;
use crate::connections::ConnectionProfile;

/// `mysqldump` with sensible dump defaults, writing to stdout.
pub struct MySql;

impl DumpTool for MySql {
    fn tool(&self) -> &'static str {
        "mysqldump"
    }

    fn command(
        &self,
        tool_path: &Path,
        profile: &ConnectionProfile,
        host: &str,
        port: u16,
    ) -> Command {
        let mut cmd = Command::new(tool_path);
        cmd.arg("--opt") // sensible dump defaults
            .arg("--single-transaction")
            .arg("-h")
            .arg(host)
            .arg("-P")
            .arg(port.to_string())
            .arg("-u")
            .arg(&profile.username);

        if let Some(password) = &profile.password {
            cmd.arg(format!("-p{password}"));
        }

        cmd.arg(&profile.database);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::DatabaseKind;

    #[test]
    fn database_name_comes_last() {
        let profile = ConnectionProfile {
            name: "shop".into(),
            kind: DatabaseKind::MariaDb,
            host: "db.internal".into(),
            port: Some(3307),
            username: "velld".into(),
            password: None,
            database: "shop".into(),
            ssl: false,
            ssh: None,
        };

        let cmd = MySql.command(Path::new("/usr/bin/mysqldump"), &profile, "db.internal", 3307);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.last().map(String::as_str), Some("shop"));
        assert!(args.contains(&"--single-transaction".to_string()));
        // No password, no -p argument at all.
        assert!(!args.iter().any(|a| a.starts_with("-p") && a != "-P"));
    }
}
