//! Transport launcher: locates the analysis server executable and spawns it
//! with a piped standard-stream channel.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tracing::info;

use crate::error::{ClientError, Result};

/// Name of the analysis server executable, expected one directory above the
/// extension install root.
#[cfg(windows)]
pub const SERVER_EXECUTABLE: &str = "c64lsp.exe";
#[cfg(not(windows))]
pub const SERVER_EXECUTABLE: &str = "c64lsp";

/// How protocol bytes move between client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Piped standard input/output of the child process.
    Stdio,
}

/// Identifies how to reach the analysis server. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
    pub command: PathBuf,
    pub transport: TransportKind,
}

/// Which run configuration to launch the server with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Run,
    Debug,
}

/// Run configuration for the server process. The normal and debug variants
/// share one descriptor; the debug variant only appends diagnostic flags.
#[derive(Debug, Clone)]
pub struct TransportProfile {
    pub descriptor: ServerDescriptor,
    /// Extra flags appended when launching in [`LaunchMode::Debug`].
    pub debug_flags: Vec<String>,
}

impl TransportProfile {
    pub fn args_for(&self, mode: LaunchMode) -> &[String] {
        match mode {
            LaunchMode::Run => &[],
            LaunchMode::Debug => &self.debug_flags,
        }
    }
}

/// Resolve the server executable's absolute path from the extension install
/// root. Fails fast with [`ClientError::ServerUnavailable`] when the file is
/// missing or not executable, before any process is spawned.
pub fn resolve_server_path(install_root: &Path) -> Result<PathBuf> {
    let parent = install_root.parent().unwrap_or(install_root);
    let candidate = parent.join(SERVER_EXECUTABLE);

    let metadata = std::fs::metadata(&candidate).map_err(|e| ClientError::ServerUnavailable {
        path: candidate.clone(),
        reason: e.to_string(),
    })?;

    if !metadata.is_file() {
        return Err(ClientError::ServerUnavailable {
            path: candidate,
            reason: "not a regular file".to_string(),
        });
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ClientError::ServerUnavailable {
                path: candidate,
                reason: "not executable".to_string(),
            });
        }
    }

    Ok(candidate)
}

/// Build the run configuration for a resolved executable path. Pure
/// construction: both variants pipe standard streams, and the debug variant
/// carries no extra flags by default.
pub fn build_transport_profile(command: PathBuf) -> TransportProfile {
    TransportProfile {
        descriptor: ServerDescriptor {
            command,
            transport: TransportKind::Stdio,
        },
        debug_flags: Vec::new(),
    }
}

/// An open duplex channel to a (possibly external) server process.
pub struct Connection {
    /// Child handle when the transport wraps a spawned OS process; `None` for
    /// in-memory transports.
    pub child: Option<Child>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Produces the duplex channel the session runs over. The session owns the
/// connection's lifetime; the launcher only opens it.
#[async_trait]
pub(crate) trait Launch: Send + 'static {
    async fn launch(&mut self) -> Result<Connection>;
}

/// Spawns the server per its [`TransportProfile`] and pipes stdio.
pub(crate) struct StdioLauncher {
    profile: TransportProfile,
    mode: LaunchMode,
}

impl StdioLauncher {
    pub(crate) fn new(profile: TransportProfile, mode: LaunchMode) -> Self {
        StdioLauncher { profile, mode }
    }
}

#[async_trait]
impl Launch for StdioLauncher {
    async fn launch(&mut self) -> Result<Connection> {
        let command_path = &self.profile.descriptor.command;
        let mut cmd = Command::new(command_path);
        cmd.args(self.profile.args_for(self.mode));
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ClientError::ServerUnavailable {
            path: command_path.clone(),
            reason: e.to_string(),
        })?;

        let writer = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::TransportClosed("failed to take child stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::TransportClosed("failed to take child stdout".into()))?;

        info!(command = %command_path.display(), mode = ?self.mode, "server process spawned");

        Ok(Connection {
            child: Some(child),
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(writer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_finds_executable_above_install_root() {
        let root = tempfile::tempdir().unwrap();
        let install_root = root.path().join("ext");
        std::fs::create_dir(&install_root).unwrap();
        let server = root.path().join(SERVER_EXECUTABLE);
        std::fs::write(&server, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&server, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let resolved = resolve_server_path(&install_root).unwrap();
        assert_eq!(resolved, server);
    }

    #[test]
    fn test_resolve_missing_executable() {
        let root = tempfile::tempdir().unwrap();
        let install_root = root.path().join("ext");
        std::fs::create_dir(&install_root).unwrap();

        let err = resolve_server_path(&install_root).unwrap_err();
        assert!(matches!(err, ClientError::ServerUnavailable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_non_executable_file() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let install_root = root.path().join("ext");
        std::fs::create_dir(&install_root).unwrap();
        let server = root.path().join(SERVER_EXECUTABLE);
        std::fs::write(&server, "not runnable").unwrap();
        std::fs::set_permissions(&server, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = resolve_server_path(&install_root).unwrap_err();
        assert!(matches!(err, ClientError::ServerUnavailable { .. }));
    }

    #[test]
    fn test_profile_variants_share_descriptor() {
        let mut profile = build_transport_profile(PathBuf::from("/opt/c64lsp"));
        assert_eq!(profile.descriptor.transport, TransportKind::Stdio);
        assert!(profile.args_for(LaunchMode::Run).is_empty());
        assert!(profile.args_for(LaunchMode::Debug).is_empty());

        profile.debug_flags = vec!["--log-level=debug".to_string()];
        assert!(profile.args_for(LaunchMode::Run).is_empty());
        assert_eq!(profile.args_for(LaunchMode::Debug), ["--log-level=debug"]);
    }
}
