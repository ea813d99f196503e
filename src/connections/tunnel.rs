//! Local port forwarding over the system `ssh` client.
//!
//! Profiles that can only reach their database through a bastion host get a
//! `ssh -N -L` forward from an ephemeral local port to the database, and the
//! dump command connects to `127.0.0.1:<local_port>` instead. The child is
//! terminated when the [SshTunnel] guard drops.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use derive_more::{Display, Error};

use super::SshProfile;

const ESTABLISH_ATTEMPTS: u32 = 40;
const ESTABLISH_INTERVAL: Duration = Duration::from_millis(250);

/// Errors establishing or operating the tunnel.
#[derive(Debug, Display, Error)]
pub enum SshTunnelError {
    /// No free local port could be reserved for the forward.
    #[display("unable to reserve a local port for the tunnel: {_0}")]
    NoLocalPort(io::Error),

    /// The ssh client could not be spawned.
    #[display("unable to spawn the ssh client: {_0}")]
    Spawn(io::Error),

    /// The ssh client exited before the forward came up.
    #[display("ssh client exited before the forward was established")]
    ClientExited,

    /// The forward never accepted a connection within the grace period.
    #[display("tunnel did not come up within the grace period")]
    NotEstablished,
}

/// A running `ssh -N -L` forward.
pub struct SshTunnel {
    child: Child,
    local_port: u16,
}

impl SshTunnel {
    /// Open a forward from an ephemeral local port to `remote_host:remote_port`
    /// as seen from the SSH server.
    pub fn open(
        ssh: &SshProfile,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<SshTunnel, SshTunnelError> {
        let local_port = reserve_local_port().map_err(SshTunnelError::NoLocalPort)?;

        let mut command = Command::new("ssh");
        command
            .arg("-N")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ExitOnForwardFailure=yes")
            .arg("-p")
            .arg(ssh.port.to_string())
            .arg("-L")
            .arg(format!(
                "127.0.0.1:{local_port}:{remote_host}:{remote_port}"
            ))
            .arg(format!("{}@{}", ssh.username, ssh.host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(key_file) = &ssh.key_file {
            command.arg("-i").arg(key_file);
        }

        log::debug!(
            target: "connections::tunnel",
            "Opening tunnel 127.0.0.1:{local_port} -> {remote_host}:{remote_port} via {}@{}:{}",
            ssh.username,
            ssh.host,
            ssh.port
        );
        let mut child = command.spawn().map_err(SshTunnelError::Spawn)?;

        // Wait for the forward to accept connections before handing the
        // local endpoint to a dump command.
        for _ in 0..ESTABLISH_ATTEMPTS {
            if child
                .try_wait()
                .map_err(SshTunnelError::Spawn)?
                .is_some()
            {
                return Err(SshTunnelError::ClientExited);
            }

            if TcpStream::connect(("127.0.0.1", local_port)).is_ok() {
                log::debug!(target: "connections::tunnel", "Tunnel on local port {local_port} established");
                return Ok(SshTunnel { child, local_port });
            }

            thread::sleep(ESTABLISH_INTERVAL);
        }

        let _ = child.kill();
        let _ = child.wait();
        Err(SshTunnelError::NotEstablished)
    }

    /// Local endpoint dump commands should connect to.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn local_host(&self) -> &'static str {
        "127.0.0.1"
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        log::debug!(target: "connections::tunnel", "Closing tunnel on local port {}", self.local_port);
        if let Err(e) = self.child.kill() {
            log::warn!(target: "connections::tunnel", "Failed to terminate ssh client: {e}");
        }
        let _ = self.child.wait();
    }
}

/// Reserve an ephemeral port by binding it once and releasing it again.
///
/// Another process can grab the port between release and the ssh spawn;
/// the forward then fails to establish and the backup aborts.
fn reserve_local_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
