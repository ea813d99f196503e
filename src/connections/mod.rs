//! Registered database connections.
//!
//! A [ConnectionProfile] describes one database reachable for backups,
//! optionally through an SSH tunnel. Profiles live in the TOML config file;
//! credentials never appear in logs or exports, see [redact_secrets].

pub mod tunnel;

pub use tunnel::{SshTunnel, SshTunnelError};

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use derive_more::Display;
use regex::Regex;

/// Database engines velld can back up.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[display("postgresql")]
    PostgreSql,
    #[display("mysql")]
    MySql,
    #[display("mariadb")]
    MariaDb,
    #[display("mongodb")]
    MongoDb,
}

impl DatabaseKind {
    /// Conventional server port, used when a profile doesn't set one.
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::PostgreSql => 5432,
            DatabaseKind::MySql | DatabaseKind::MariaDb => 3306,
            DatabaseKind::MongoDb => 27017,
        }
    }
}

/// SSH settings of a profile that is reached through a tunnel.
///
/// Only key-file authentication is supported: the tunnel drives the system
/// `ssh` client, which cannot take a password non-interactively.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SshProfile {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub username: String,

    /// Private key presented to the SSH server. `None` falls back to the
    /// ssh client's own defaults (agent, ~/.ssh/id_*).
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

fn default_ssh_port() -> u16 {
    22
}

/// One registered database connection.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct ConnectionProfile {
    /// Unique name the CLI and schedules refer to.
    pub name: String,

    #[serde(rename = "type")]
    pub kind: DatabaseKind,

    pub host: String,

    /// Server port; defaults to the engine's conventional port.
    #[serde(default)]
    pub port: Option<u16>,

    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    pub database: String,

    #[serde(default)]
    pub ssl: bool,

    /// Reach the database through an SSH tunnel.
    #[serde(default)]
    pub ssh: Option<SshProfile>,
}

impl ConnectionProfile {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }
}

// Credentials stay out of debug output.
impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("ssl", &self.ssl)
            .field("ssh", &self.ssh)
            .finish()
    }
}

/// Look a profile up by name.
pub fn find_profile<'a>(
    profiles: &'a [ConnectionProfile],
    name: &str,
) -> Option<&'a ConnectionProfile> {
    profiles.iter().find(|p| p.name == name)
}

/// Mask credential material before a command line or profile text is logged.
///
/// Covers `password=...`/`PGPASSWORD=...` assignments, mongodump's separated
/// `--password <secret>` argument and mysql's glued `-p<password>` argument.
pub fn redact_secrets(line: &str) -> String {
    static ASSIGNMENT: OnceLock<Regex> = OnceLock::new();
    static GLUED_FLAG: OnceLock<Regex> = OnceLock::new();

    let assignment = ASSIGNMENT
        .get_or_init(|| Regex::new(r"(?i)((?:pg)?password[=:\s]\s*)\S+").expect("valid regex"));
    let glued_flag =
        GLUED_FLAG.get_or_init(|| Regex::new(r"(\s-p)\S+").expect("valid regex"));

    let masked = assignment.replace_all(line, "${1}***");
    glued_flag.replace_all(&masked, "${1}***").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ConnectionProfile {
        ConnectionProfile {
            name: "orders".to_string(),
            kind: DatabaseKind::PostgreSql,
            host: "db.internal".to_string(),
            port: None,
            username: "velld".to_string(),
            password: Some("s3cret".to_string()),
            database: "orders".to_string(),
            ssl: false,
            ssh: None,
        }
    }

    #[test]
    fn port_falls_back_to_the_engine_default() {
        let mut p = profile();
        assert_eq!(p.port(), 5432);
        p.port = Some(5433);
        assert_eq!(p.port(), 5433);
        p.kind = DatabaseKind::MariaDb;
        p.port = None;
        assert_eq!(p.port(), 3306);
    }

    #[test]
    fn debug_output_masks_the_password() {
        let rendered = format!("{:?}", profile());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn redact_masks_password_assignments() {
        let line = "PGPASSWORD=s3cret pg_dump -h db.internal";
        let masked = redact_secrets(line);
        assert!(!masked.contains("s3cret"));
        assert!(masked.contains("PGPASSWORD=***"));
    }

    #[test]
    fn redact_masks_separated_password_arguments() {
        let masked = redact_secrets("mongodump --host mongo --password s3cret --db events");
        assert!(!masked.contains("s3cret"));
        assert!(masked.contains("--password ***"));
    }

    #[test]
    fn redact_masks_glued_mysql_password_flag() {
        let masked = redact_secrets("mysqldump -h db -u velld -ps3cret orders");
        assert!(!masked.contains("s3cret"));
        assert!(masked.contains("-p***"));
    }

    #[test]
    fn profile_parses_from_toml() {
        let raw = r#"
            name = "orders"
            type = "postgresql"
            host = "db.internal"
            username = "velld"
            password = "s3cret"
            database = "orders"

            [ssh]
            host = "bastion"
            username = "tunnel"
        "#;
        let profile: ConnectionProfile = toml::from_str(raw).unwrap();
        assert_eq!(profile.kind, DatabaseKind::PostgreSql);
        assert_eq!(profile.port(), 5432);
        let ssh = profile.ssh.unwrap();
        assert_eq!(ssh.port, 22);
        assert!(ssh.key_file.is_none());
    }
}
