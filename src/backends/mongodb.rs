//! MongoDB dumps via `mongodump`.

use std::path::Path;
use std::process::Command;

use crate::backends::DumpTool;
use crate::connections::ConnectionProfile;

/// `mongodump` in archive mode, streaming the whole database to stdout.
///
/// The archive format is binary, so MongoDB artifacts are stored as
/// `.archive.gz` and are not eligible for line comparison.
pub struct MongoDb;

impl DumpTool for MongoDb {
    fn tool(&self) -> &'static str {
        "mongodump"
    }

    fn extension(&self) -> &'static str {
        "archive"
    }

    fn command(
        &self,
        tool_path: &Path,
        profile: &ConnectionProfile,
        host: &str,
        port: u16,
    ) -> Command {
        let mut cmd = Command::new(tool_path);
        cmd.arg("--host")
            .arg(host)
            .arg("--port")
            .arg(port.to_string())
            .arg("--db")
            .arg(&profile.database)
            .arg("--archive");

        if !profile.username.is_empty() {
            cmd.arg("--username").arg(&profile.username);
        }
        if let Some(password) = &profile.password {
            cmd.arg("--password").arg(password);
        }
        if profile.ssl {
            cmd.arg("--ssl");
        }

        cmd
    }
}
