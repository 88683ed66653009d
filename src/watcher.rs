//! File-system watch registration feeding document-synchronization events.
//!
//! A [`SyncSubscription`] holds a `notify` watcher over the workspace root for
//! the session's lifetime. Create/modify/remove events for paths matching the
//! document selector are mapped to `lsp_types::FileEvent`s and queued for the
//! session loop, which forwards them as `workspace/didChangeWatchedFiles`
//! notifications. Dropping the subscription releases the OS watch.

use std::path::Path;

use lsp_types::{FileChangeType, FileEvent, Url};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::selector::DocumentSelector;

/// Map a raw `notify` event to zero or more protocol file events, filtered
/// through the selector.
fn file_events(event: &Event, selector: &DocumentSelector) -> Vec<FileEvent> {
    let typ = match event.kind {
        EventKind::Create(_) => FileChangeType::CREATED,
        EventKind::Modify(_) => FileChangeType::CHANGED,
        EventKind::Remove(_) => FileChangeType::DELETED,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| Url::from_file_path(path).ok())
        .filter(|uri| selector.matches(uri))
        .map(|uri| FileEvent { uri, typ })
        .collect()
}

/// Watch registration over the workspace root for BASIC source changes.
///
/// Owned exclusively by the client session; released on deactivation.
pub struct SyncSubscription {
    // Kept alive for the subscription's lifetime; dropping it stops the watch.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl SyncSubscription {
    /// Register a recursive watch rooted at `root`, delivering events whose
    /// paths match `selector`.
    pub fn register(root: &Path, selector: &DocumentSelector) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let glob = selector.glob().to_string();
        let selector = selector.clone();

        // The callback runs on notify's own thread; the unbounded sender is
        // safe to use from a synchronous context.
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in file_events(&event, &selector) {
                        if tx.send(file_event).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => warn!(%err, "file watcher delivery error"),
            })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), %glob, "watch registered");

        Ok(SyncSubscription { _watcher: watcher, rx })
    }

    /// Receive the next matching file event. Returns `None` once the watcher
    /// thread has gone away.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }
}
