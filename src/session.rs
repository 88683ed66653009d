//! Client session lifecycle: handshake, document synchronization, shutdown.
//!
//! A [`ClientSession`] is a handle to a dedicated task that owns the
//! connection to the analysis server. All operations are serialized through
//! the task's mailbox, so state transitions never race: `start()`, `stop()`
//! and document notifications enqueue work and resolve when the task has
//! carried it out. Document notifications travel through the same mailbox
//! and are written to the transport one at a time, which preserves
//! host-emission order.

use std::path::PathBuf;
use std::time::Duration;

use lsp_types::Url;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::launcher::{Launch, LaunchMode, StdioLauncher, TransportProfile};
use crate::lsp::framing;
use crate::lsp::message_parser;
use crate::lsp::messages;
use crate::lsp::types::{Message, MessageFactory, SendMessage};
use crate::selector::DocumentSelector;
use crate::watcher::SyncSubscription;

/// Session lifecycle states. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Document lifecycle event emitted by the host editor.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Opened { uri: Url, text: String, version: i32 },
    Changed { uri: Url, text: String, version: i32 },
    Saved { uri: Url, text: Option<String> },
    Closed { uri: Url },
}

impl DocumentEvent {
    pub fn uri(&self) -> &Url {
        match self {
            DocumentEvent::Opened { uri, .. }
            | DocumentEvent::Changed { uri, .. }
            | DocumentEvent::Saved { uri, .. }
            | DocumentEvent::Closed { uri } => uri,
        }
    }
}

/// Asynchronous deliveries from the session to the host.
#[derive(Debug)]
pub enum SessionEvent {
    /// Server-originated notification or response, relayed as-is. Payload
    /// contents are owned by the server contract.
    ServerMessage(Message),
    /// Fault that occurred outside any host-initiated call, e.g. the server
    /// process crashing while the session was running.
    Fault(ClientError),
}

/// Bounds on the two protocol round-trips the session waits for. The
/// protocol itself imposes none, but an unbounded wait would hang the host
/// if the server misbehaves.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub handshake: Duration,
    pub shutdown: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            handshake: Duration::from_secs(10),
            shutdown: Duration::from_secs(5),
        }
    }
}

enum Command {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<()>>),
    Document(DocumentEvent),
}

/// Handle to the single client-to-server connection of this host process.
///
/// Construction spawns the session task but does not touch the server;
/// nothing happens until `start()`. Dropping the handle tears the session
/// down in the background.
#[derive(Debug)]
pub struct ClientSession {
    id: String,
    name: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl ClientSession {
    /// Create a session that will spawn the server per `profile` when
    /// started. Must be called from within a tokio runtime.
    pub fn new(
        id: &str,
        name: &str,
        profile: TransportProfile,
        mode: LaunchMode,
        selector: DocumentSelector,
        workspace_root: Option<PathBuf>,
        timeouts: Timeouts,
    ) -> Self {
        Self::with_launcher(
            id,
            name,
            Box::new(StdioLauncher::new(profile, mode)),
            selector,
            workspace_root,
            timeouts,
        )
    }

    pub(crate) fn with_launcher(
        id: &str,
        name: &str,
        launcher: Box<dyn Launch>,
        selector: DocumentSelector,
        workspace_root: Option<PathBuf>,
        timeouts: Timeouts,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Uninitialized);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = SessionTask {
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            launcher,
            selector,
            workspace_root,
            timeouts,
        };
        tokio::spawn(task.run());

        ClientSession {
            id: id.to_string(),
            name: name.to_string(),
            commands: command_tx,
            state: state_rx,
            events: Some(event_rx),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions (for hosts that surface progress).
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Take the receiver for server messages and asynchronous faults. Yields
    /// `Some` only on first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Spawn the server, open the transport, and complete the initialization
    /// handshake. Resolves once the session is Running.
    ///
    /// Calling `start()` while the session is already starting or running is
    /// a no-op: at most one server process exists per session.
    pub async fn start(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Start(done_tx)).is_err() {
            return Err(ClientError::InvalidState("session task has exited".into()));
        }
        done_rx
            .await
            .map_err(|_| ClientError::InvalidState("session task dropped mid-start".into()))?
    }

    /// Shut the session down: shutdown request, exit notification, transport
    /// close, process termination, watch release. Idempotent; `stop()` on a
    /// session that never started (or already stopped) resolves immediately.
    pub async fn stop(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Stop(done_tx)).is_err() {
            // Task already gone means everything is released.
            return Ok(());
        }
        match done_rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Enqueue a document lifecycle event for forwarding. Non-blocking;
    /// events for documents outside the selector, or arriving while the
    /// session is not running, are dropped.
    pub fn notify_document(&self, event: DocumentEvent) {
        let _ = self.commands.send(Command::Document(event));
    }
}

struct SessionTask {
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
    launcher: Box<dyn Launch>,
    selector: DocumentSelector,
    workspace_root: Option<PathBuf>,
    timeouts: Timeouts,
}

impl SessionTask {
    fn set_state(&self, next: SessionState) {
        debug!(state = ?next, "session state transition");
        let _ = self.state.send(next);
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Start(done) => {
                    self.start_and_serve(done).await;
                    break;
                }
                Command::Stop(done) => {
                    // stop() before any start(): nothing to release.
                    self.set_state(SessionState::Stopped);
                    let _ = done.send(Ok(()));
                    break;
                }
                Command::Document(_) => {}
            }
        }
        self.drain().await;
    }

    /// Terminal phase: keep answering the mailbox so late callers never hang.
    async fn drain(&mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Stop(done) => {
                    let _ = done.send(Ok(()));
                }
                Command::Start(done) => {
                    let _ = done.send(Err(ClientError::InvalidState(
                        "session already stopped; re-activate to restart".into(),
                    )));
                }
                Command::Document(_) => {}
            }
        }
    }

    async fn start_and_serve(&mut self, done: oneshot::Sender<Result<()>>) {
        self.set_state(SessionState::Starting);

        let connection = match self.launcher.launch().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(%e, "server process failed to launch");
                self.set_state(SessionState::Failed);
                let _ = done.send(Err(e));
                return;
            }
        };
        let mut child = connection.child;
        let mut writer = connection.writer;

        let (message_tx, mut incoming) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(connection.reader, message_tx));

        let mut factory = MessageFactory::new();

        match self
            .handshake(&mut writer, &mut incoming, &mut factory)
            .await
        {
            HandshakeOutcome::Ready => {}
            HandshakeOutcome::Failed(e) => {
                warn!(%e, "initialization handshake failed");
                terminate(&mut child).await;
                reader_task.abort();
                self.set_state(SessionState::Failed);
                let _ = done.send(Err(e));
                return;
            }
            HandshakeOutcome::Canceled(stop_done) => {
                info!("stop() during startup: handshake canceled");
                terminate(&mut child).await;
                reader_task.abort();
                self.set_state(SessionState::Stopped);
                let _ = done.send(Err(ClientError::StartupCanceled));
                let _ = stop_done.send(Ok(()));
                return;
            }
            HandshakeOutcome::HandleGone => {
                terminate(&mut child).await;
                reader_task.abort();
                self.set_state(SessionState::Stopped);
                return;
            }
        }

        // Watch registration is part of reaching Running; a session that
        // cannot observe file events must not pretend to be synchronized.
        let mut subscription = None;
        if let Some(root) = self.workspace_root.as_deref() {
            match SyncSubscription::register(root, &self.selector) {
                Ok(s) => subscription = Some(s),
                Err(e) => {
                    warn!(%e, "watch registration failed");
                    terminate(&mut child).await;
                    reader_task.abort();
                    self.set_state(SessionState::Failed);
                    let _ = done.send(Err(e));
                    return;
                }
            }
        }

        info!("session running");
        self.set_state(SessionState::Running);
        let _ = done.send(Ok(()));

        self.serve(writer, incoming, child, subscription, factory, reader_task)
            .await;
    }

    /// Send `initialize`, then wait for the acknowledgment while staying
    /// responsive to the mailbox so a concurrent `stop()` can cancel the
    /// wait.
    async fn handshake(
        &mut self,
        writer: &mut Box<dyn AsyncWrite + Send + Unpin>,
        incoming: &mut mpsc::UnboundedReceiver<Result<Message>>,
        factory: &mut MessageFactory,
    ) -> HandshakeOutcome {
        let request = match messages::initialize_request(factory, self.workspace_root.as_deref()) {
            Ok(request) => request,
            Err(e) => return HandshakeOutcome::Failed(e),
        };
        let init_id = request.id;
        if let Err(e) = send(writer, &SendMessage::Request(request)).await {
            return HandshakeOutcome::Failed(e);
        }

        let deadline = Instant::now() + self.timeouts.handshake;
        loop {
            tokio::select! {
                message = incoming.recv() => match message {
                    Some(Ok(Message::Response(response))) if response.id == init_id => {
                        break;
                    }
                    Some(Ok(Message::Error(response))) if response.id == init_id => {
                        let reason = response
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "unspecified error".to_string());
                        return HandshakeOutcome::Failed(ClientError::HandshakeRejected(reason));
                    }
                    // Early server chatter (log messages, progress) is not
                    // actionable before the session is running.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return HandshakeOutcome::Failed(ClientError::TransportClosed(
                            e.to_string(),
                        ));
                    }
                    None => {
                        return HandshakeOutcome::Failed(ClientError::TransportClosed(
                            "channel closed during handshake".to_string(),
                        ));
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Stop(stop_done)) => {
                        return HandshakeOutcome::Canceled(stop_done);
                    }
                    Some(Command::Start(again)) => {
                        // Already starting; must not spawn a second process.
                        let _ = again.send(Ok(()));
                    }
                    Some(Command::Document(_)) => {}
                    None => return HandshakeOutcome::HandleGone,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    return HandshakeOutcome::Failed(ClientError::HandshakeTimeout(
                        self.timeouts.handshake,
                    ));
                }
            }
        }

        if let Err(e) = send(
            writer,
            &SendMessage::Notification(messages::initialized_notification()),
        )
        .await
        {
            return HandshakeOutcome::Failed(e);
        }

        HandshakeOutcome::Ready
    }

    /// Running state: forward document and watch events, relay server
    /// messages, react to stop() and to the transport going away.
    async fn serve(
        &mut self,
        mut writer: Box<dyn AsyncWrite + Send + Unpin>,
        mut incoming: mpsc::UnboundedReceiver<Result<Message>>,
        mut child: Option<Child>,
        mut subscription: Option<SyncSubscription>,
        mut factory: MessageFactory,
        reader_task: JoinHandle<()>,
    ) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Document(event)) => {
                        if !self.selector.matches(event.uri()) {
                            continue;
                        }
                        let notification = match messages::document_notification(&event) {
                            Ok(n) => n,
                            Err(e) => {
                                warn!(%e, "failed to encode document notification");
                                continue;
                            }
                        };
                        if let Err(e) = send(&mut writer, &SendMessage::Notification(notification)).await {
                            self.transport_fault(e, &mut child).await;
                            reader_task.abort();
                            return;
                        }
                    }
                    Some(Command::Stop(stop_done)) => {
                        // Release the watch before the protocol goodbye.
                        drop(subscription.take());
                        let result = self
                            .shutdown(&mut writer, &mut incoming, &mut factory, &mut child)
                            .await;
                        reader_task.abort();
                        self.set_state(SessionState::Stopped);
                        let _ = stop_done.send(result);
                        return;
                    }
                    Some(Command::Start(again)) => {
                        let _ = again.send(Ok(()));
                    }
                    None => {
                        // Handle dropped: tear down with no one to notify.
                        drop(subscription.take());
                        let _ = self
                            .shutdown(&mut writer, &mut incoming, &mut factory, &mut child)
                            .await;
                        reader_task.abort();
                        self.set_state(SessionState::Stopped);
                        return;
                    }
                },
                message = incoming.recv() => match message {
                    Some(Ok(message)) => {
                        let _ = self.events.send(SessionEvent::ServerMessage(message));
                    }
                    Some(Err(e)) => {
                        drop(subscription.take());
                        self.transport_fault(ClientError::TransportClosed(e.to_string()), &mut child)
                            .await;
                        reader_task.abort();
                        return;
                    }
                    None => {
                        drop(subscription.take());
                        self.transport_fault(
                            ClientError::TransportClosed("server closed the channel".to_string()),
                            &mut child,
                        )
                        .await;
                        reader_task.abort();
                        return;
                    }
                },
                file_event = next_file_event(&mut subscription) => match file_event {
                    Some(event) => {
                        let notification = match messages::watched_files_notification(vec![event]) {
                            Ok(n) => n,
                            Err(e) => {
                                warn!(%e, "failed to encode watched-files notification");
                                continue;
                            }
                        };
                        if let Err(e) = send(&mut writer, &SendMessage::Notification(notification)).await {
                            self.transport_fault(e, &mut child).await;
                            reader_task.abort();
                            return;
                        }
                    }
                    None => {
                        // Watcher thread went away; keep the session alive.
                        subscription = None;
                    }
                },
            }
        }
    }

    /// Orderly Running → Stopping → Stopped: shutdown request, bounded wait
    /// for the acknowledgment, exit notification regardless of how the wait
    /// ended, then process termination.
    async fn shutdown(
        &mut self,
        writer: &mut Box<dyn AsyncWrite + Send + Unpin>,
        incoming: &mut mpsc::UnboundedReceiver<Result<Message>>,
        factory: &mut MessageFactory,
        child: &mut Option<Child>,
    ) -> Result<()> {
        self.set_state(SessionState::Stopping);

        let request = messages::shutdown_request(factory);
        let shutdown_id = request.id;
        let mut result = Ok(());

        match send(writer, &SendMessage::Request(request)).await {
            Ok(()) => {
                let deadline = Instant::now() + self.timeouts.shutdown;
                loop {
                    tokio::select! {
                        message = incoming.recv() => match message {
                            Some(Ok(Message::Response(response))) if response.id == shutdown_id => break,
                            Some(Ok(Message::Error(response))) if response.id == shutdown_id => break,
                            Some(Ok(_)) => {}
                            // Channel gone: nothing left to wait for.
                            Some(Err(_)) | None => break,
                        },
                        _ = tokio::time::sleep_until(deadline) => {
                            warn!(timeout = ?self.timeouts.shutdown, "shutdown not acknowledged; force-terminating");
                            result = Err(ClientError::ShutdownTimeout(self.timeouts.shutdown));
                            break;
                        }
                    }
                }
                let _ = send(writer, &SendMessage::Notification(messages::exit_notification())).await;
            }
            Err(e) => result = Err(e),
        }

        terminate(child).await;
        result
    }

    async fn transport_fault(&mut self, error: ClientError, child: &mut Option<Child>) {
        warn!(%error, "transport closed unexpectedly");
        terminate(child).await;
        self.set_state(SessionState::Stopped);
        let _ = self.events.send(SessionEvent::Fault(error));
    }
}

enum HandshakeOutcome {
    Ready,
    Failed(ClientError),
    /// `stop()` arrived mid-handshake; carries its completion sender.
    Canceled(oneshot::Sender<Result<()>>),
    /// The session handle was dropped.
    HandleGone,
}

async fn next_file_event(subscription: &mut Option<SyncSubscription>) -> Option<lsp_types::FileEvent> {
    match subscription.as_mut() {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn send<W>(writer: &mut W, message: &SendMessage) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let json = message.to_json()?;
    framing::write_message_to(writer, &json).await
}

/// Reap the child if the transport wraps one: a short grace for voluntary
/// exit, then a kill.
async fn terminate(child: &mut Option<Child>) {
    if let Some(child) = child.as_mut() {
        match tokio::time::timeout(Duration::from_millis(300), child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "server process exited"),
            Ok(Err(e)) => debug!(%e, "error waiting for server process"),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!(%e, "failed to kill server process");
                }
            }
        }
    }
}

async fn read_loop(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    messages: mpsc::UnboundedSender<Result<Message>>,
) {
    loop {
        match framing::read_message_from(&mut reader).await {
            Ok(body) => match message_parser::parse_message_from_str(&body) {
                Ok(message) => {
                    if messages.send(Ok(message)).is_err() {
                        return;
                    }
                }
                Err(e) => debug!(%e, "skipping unrecognized payload"),
            },
            Err(e) => {
                let _ = messages.send(Err(e));
                return;
            }
        }
    }
}
