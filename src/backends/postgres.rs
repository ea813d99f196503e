//! PostgreSQL dumps via `pg_dump`.

use std::path::Path;
use std::process::Command;

use crate::backends::DumpTool;
use crate::connections::ConnectionProfile;

/// Plain-format `pg_dump` writing to stdout.
pub struct Postgres;

impl DumpTool for Postgres {
    fn tool(&self) -> &'static str {
        "pg_dump"
    }

    fn command(
        &self,
        tool_path: &Path,
        profile: &ConnectionProfile,
        host: &str,
        port: u16,
    ) -> Command {
        let mut cmd = Command::new(tool_path);
        cmd.arg("-h")
            .arg(host)
            .arg("-p")
            .arg(port.to_string())
            .arg("-U")
            .arg(&profile.username)
            .arg("-d")
            .arg(&profile.database);

        // Credentials go through the environment, never the command line.
        if let Some(password) = &profile.password {
            cmd.env("PGPASSWORD", password);
        }
        if profile.ssl {
            cmd.env("PGSSLMODE", "require");
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::DatabaseKind;

    #[test]
    fn command_targets_the_effective_endpoint() {
        let profile = ConnectionProfile {
            name: "orders".into(),
            kind: DatabaseKind::PostgreSql,
            host: "db.internal".into(),
            port: None,
            username: "velld".into(),
            password: Some("s3cret".into()),
            database: "orders".into(),
            ssl: false,
            ssh: None,
        };

        // Tunneled endpoint overrides the profile's own host and port.
        let cmd = Postgres.command(Path::new("/usr/bin/pg_dump"), &profile, "127.0.0.1", 15432);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["-h", "127.0.0.1", "-p", "15432", "-U", "velld", "-d", "orders"]);

        let envs: Vec<(String, String)> = cmd
            .get_envs()
            .filter_map(|(k, v)| {
                Some((
                    k.to_string_lossy().into_owned(),
                    v?.to_string_lossy().into_owned(),
                ))
            })
            .collect();
        assert!(envs.contains(&("PGPASSWORD".into(), "s3cret".into())));
    }
}
