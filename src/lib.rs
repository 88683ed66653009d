//! Client-side bootstrap for the Commodore 64 BASIC language server.
//!
//! The analysis itself lives in the external `c64lsp` process; this crate
//! owns everything between the editor host and that process: locating and
//! spawning the executable, the stdio transport, the initialize handshake,
//! forwarding of `*.bas` document and file-watch events, and orderly
//! shutdown.
//!
//! Hosts drive the crate through [`activate`] / [`deactivate`], mirroring an
//! editor extension's lifecycle, or construct a [`ClientSession`] directly
//! for finer control.

pub mod error;
pub mod launcher;
pub mod lsp;
pub mod selector;
pub mod session;
pub mod watcher;

use std::path::PathBuf;

pub use error::{ClientError, Result};
pub use launcher::{
    build_transport_profile, resolve_server_path, LaunchMode, ServerDescriptor, TransportKind,
    TransportProfile,
};
pub use selector::DocumentSelector;
pub use session::{ClientSession, DocumentEvent, SessionEvent, SessionState, Timeouts};
pub use watcher::SyncSubscription;

/// Identifier of the single session an editor host runs.
pub const CLIENT_ID: &str = "c64lsp";
/// Display name shown by hosts.
pub const CLIENT_NAME: &str = "Commodore 64 BASIC Language Server";

/// What the host editor supplies at activation time.
#[derive(Debug, Clone)]
pub struct ExtensionContext {
    /// The extension's install directory; the server executable is resolved
    /// relative to it.
    pub install_root: PathBuf,
    /// Root of the workspace whose `*.bas` files are watched, if any.
    pub workspace_root: Option<PathBuf>,
}

/// Activation entry point: resolve the server executable, build its run
/// configuration, and start the session. The returned handle is the one
/// live session of this host process; a host must deactivate it before
/// activating again.
///
/// # Errors
///
/// `ServerUnavailable` when the executable is missing or not runnable (no
/// process is spawned), or any handshake failure from
/// [`ClientSession::start`].
pub async fn activate(context: &ExtensionContext) -> Result<ClientSession> {
    let server_path = resolve_server_path(&context.install_root)?;
    let profile = build_transport_profile(server_path);

    let session = ClientSession::new(
        CLIENT_ID,
        CLIENT_NAME,
        profile,
        LaunchMode::Run,
        DocumentSelector::basic_source(),
        context.workspace_root.clone(),
        Timeouts::default(),
    );
    session.start().await?;
    Ok(session)
}

/// Deactivation entry point. `None` (never activated) resolves immediately;
/// otherwise the session is stopped and its resources released.
pub async fn deactivate(session: Option<ClientSession>) -> Result<()> {
    match session {
        Some(session) => session.stop().await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activate_without_executable_fails_fast() {
        let root = tempfile::tempdir().unwrap();
        let install_root = root.path().join("ext");
        std::fs::create_dir(&install_root).unwrap();

        let context = ExtensionContext {
            install_root,
            workspace_root: None,
        };

        let err = activate(&context).await.unwrap_err();
        assert!(matches!(err, ClientError::ServerUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_deactivate_without_session_is_noop() {
        deactivate(None).await.unwrap();
    }
}
