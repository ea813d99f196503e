//! Dump backends for the supported database engines.
//!
//! Currently the following backends are implemented:
//!
//! - [Postgres]: `pg_dump` for PostgreSQL databases.
//! - [MySql]: `mysqldump` for MySQL and MariaDB databases.
//! - [MongoDb]: `mongodump` archive streams for MongoDB databases.
//!
//! Each backend builds the engine-specific dump command; [dump_to_writer]
//! drives it and streams its stdout into the caller's writer (usually a
//! gzip encoder over the artifact file, or a sink on dry runs).

pub mod mongodb;
pub mod mysql;
pub mod postgres;

pub use mongodb::MongoDb;
pub use mysql::MySql;
pub use postgres::Postgres;

use std::env;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use derive_more::{Display, Error, From};

use crate::connections::{redact_secrets, ConnectionProfile, DatabaseKind};

/// Generic dump backend for one database engine.
pub trait DumpTool {
    /// Executable the backend drives.
    fn tool(&self) -> &'static str;

    /// Extension of the produced artifact, before compression.
    fn extension(&self) -> &'static str {
        "sql"
    }

    /// Build the dump command against the effective endpoint.
    ///
    /// `host` and `port` may differ from the profile when the database is
    /// reached through an SSH tunnel.
    fn command(
        &self,
        tool_path: &Path,
        profile: &ConnectionProfile,
        host: &str,
        port: u16,
    ) -> Command;
}

/// The backend responsible for a database kind.
pub fn backend_for(kind: DatabaseKind) -> &'static dyn DumpTool {
    match kind {
        DatabaseKind::PostgreSql => &Postgres,
        DatabaseKind::MySql | DatabaseKind::MariaDb => &MySql,
        DatabaseKind::MongoDb => &MongoDb,
    }
}

/// Errors of a single dump run.
#[derive(Debug, Display, Error, From)]
pub enum DumpError {
    /// The dump executable is not installed or not on `PATH`.
    #[display("required tool {tool} is not installed or not on PATH")]
    ToolNotFound { tool: String },

    /// The dump process exited unsuccessfully.
    #[display("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },

    #[from]
    Io(io::Error),
}

/// Locate `tool` on `PATH` before spawning anything.
pub fn resolve_tool(tool: &str) -> Result<PathBuf, DumpError> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    env::split_paths(&path_var)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| DumpError::ToolNotFound {
            tool: tool.to_string(),
        })
}

/// Run the backend's dump command and stream its stdout into `out`.
pub fn dump_to_writer(
    backend: &dyn DumpTool,
    profile: &ConnectionProfile,
    host: &str,
    port: u16,
    out: &mut dyn Write,
) -> Result<(), DumpError> {
    let tool = backend.tool();
    let tool_path = resolve_tool(tool)?;

    let mut command = backend.command(&tool_path, profile, host, port);
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    log::debug!(
        target: "backends",
        "Running: {}",
        redact_secrets(&render_command_line(&command))
    );

    let mut child = command.spawn()?;
    log::trace!(target: "backends", "Started {tool} process");

    // Drain stderr on its own thread so a chatty tool can't stall the
    // stdout stream.
    let stderr = child.stderr.take().expect("stderr is piped");
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut stderr = stderr;
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    let stdout = child.stdout.take().expect("stdout is piped");
    let mut reader = BufReader::new(stdout);
    io::copy(&mut reader, out)?;

    let exit_status = child.wait()?;
    let stderr = stderr_reader.join().unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

    if !exit_status.success() {
        return Err(DumpError::ToolFailed {
            tool: tool.to_string(),
            stderr,
        });
    }

    // relay stderr
    if !stderr.is_empty() {
        log::warn!(target: "backends", "{tool}: {stderr}");
    }

    Ok(())
}

fn render_command_line(command: &Command) -> String {
    let mut line = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}
