//! Realtime connection supervisor.
//!
//! A single background task owns the push channel and runs the state
//! machine `Disconnected -> Connecting -> Connected -> (Disconnected |
//! Reconnecting)`.  External code talks to it through typed command and
//! inbound channels, keeping the networking fully asynchronous and
//! decoupled from any UI layer.
//!
//! Invariants:
//! - at most one live channel handle; every (re)connect tears down first
//! - a transport auth failure goes through the single-flight refresh, then
//!   one more connect attempt; refresh failure ends the session
//! - an unexpected drop schedules a retry after a fixed delay, never a
//!   tight loop
//! - a token rotation rebinds the channel; a token clear closes it for
//!   good

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use chorus_shared::protocol::{ClientFrame, ServerFrame};
use chorus_shared::types::{ConversationId, Presence, Session};

use crate::auth::AuthManager;
use crate::cache::{AppliedMessage, ChatCache};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventHub};
use crate::socket::{SocketError, SocketSink, SocketStream, SocketTransport};
use crate::tokens::TokenStore;

/// Frames queued while the channel is down, flushed after reconnect.
const OUTBOUND_BUFFER_CAP: usize = 256;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Commands sent *into* the supervisor task.
enum SupervisorCommand {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect,
    Join(ConversationId),
    Leave(ConversationId),
    Outbound(ClientFrame),
    Shutdown,
}

struct Inbound {
    gen: u64,
    kind: InboundKind,
}

enum InboundKind {
    Frame(ServerFrame),
    Closed(Option<SocketError>),
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub socket_url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl RealtimeOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            socket_url: config.socket_url.clone(),
            reconnect_delay: config.reconnect_delay,
        }
    }
}

/// Cloneable-by-Arc handle to the supervisor task.
pub struct RealtimeHandle {
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions (tests and status indicators).
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Open the push channel.  Requires a valid session; resolves after
    /// the attempt (including any token refresh) finishes.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::Connect { reply }).await?;
        rx.await
            .map_err(|_| ClientError::Realtime("supervisor stopped".into()))?
    }

    /// Close the channel.  Valid in every state; idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        self.send_cmd(SupervisorCommand::Disconnect).await
    }

    /// Track a conversation; the supervisor re-joins it after reconnects.
    pub async fn join_conversation(&self, conversation: ConversationId) -> Result<()> {
        self.send_cmd(SupervisorCommand::Join(conversation)).await
    }

    pub async fn leave_conversation(&self, conversation: ConversationId) -> Result<()> {
        self.send_cmd(SupervisorCommand::Leave(conversation)).await
    }

    /// Send a frame, buffering it while the channel is down.
    pub async fn send_frame(&self, frame: ClientFrame) -> Result<()> {
        self.send_cmd(SupervisorCommand::Outbound(frame)).await
    }

    pub async fn typing(&self, conversation: ConversationId) -> Result<()> {
        self.send_frame(ClientFrame::Typing {
            conversation_id: conversation,
        })
        .await
    }

    pub async fn stop_typing(&self, conversation: ConversationId) -> Result<()> {
        self.send_frame(ClientFrame::StopTyping {
            conversation_id: conversation,
        })
        .await
    }

    /// Stop the supervisor task for good.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Shutdown).await;
    }

    async fn send_cmd(&self, cmd: SupervisorCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::Realtime("supervisor stopped".into()))
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the supervisor in a background tokio task.
pub fn spawn_supervisor(
    options: RealtimeOptions,
    transport: Arc<dyn SocketTransport>,
    auth: Arc<AuthManager>,
    tokens: Arc<TokenStore>,
    cache: Arc<ChatCache>,
    events: EventHub,
) -> RealtimeHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let token_rx = tokens.subscribe();

    let supervisor = Supervisor {
        options,
        transport,
        auth,
        tokens,
        cache,
        events,
        state: ConnectionState::Disconnected,
        state_tx,
        token_rx,
        inbound_tx,
        inbound_rx,
        gen: 0,
        sink: None,
        reader: None,
        connected_token: None,
        joined: HashSet::new(),
        outbound: VecDeque::new(),
        retry_at: None,
    };

    let task = tokio::spawn(supervisor.run(cmd_rx));

    RealtimeHandle {
        cmd_tx,
        state_rx,
        task,
    }
}

struct Supervisor {
    options: RealtimeOptions,
    transport: Arc<dyn SocketTransport>,
    auth: Arc<AuthManager>,
    tokens: Arc<TokenStore>,
    cache: Arc<ChatCache>,
    events: EventHub,

    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    token_rx: watch::Receiver<Option<Session>>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,

    /// Bumped on every teardown so events from a stale reader are ignored.
    gen: u64,
    sink: Option<Box<dyn SocketSink>>,
    reader: Option<JoinHandle<()>>,
    /// The token the live connection was opened with.
    connected_token: Option<String>,

    joined: HashSet<ConversationId>,
    outbound: VecDeque<ClientFrame>,
    retry_at: Option<Instant>,
}

impl Supervisor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SupervisorCommand>) {
        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(SupervisorCommand::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                changed = self.token_rx.changed() => match changed {
                    Ok(()) => self.handle_token_change().await,
                    // Token store dropped: the process is going away.
                    Err(_) => break,
                },
                inbound = self.inbound_rx.recv() => {
                    if let Some(inbound) = inbound {
                        self.handle_inbound(inbound).await;
                    }
                },
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.attempt_reconnect().await;
                }
            }
        }
        self.teardown().await;
        tracing::info!("realtime supervisor stopped");
    }

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            SupervisorCommand::Disconnect => self.disconnect().await,
            SupervisorCommand::Join(conversation) => {
                self.joined.insert(conversation);
                if self.state == ConnectionState::Connected {
                    self.send_now(&ClientFrame::JoinConversation {
                        conversation_id: conversation,
                    })
                    .await;
                }
            }
            SupervisorCommand::Leave(conversation) => {
                self.joined.remove(&conversation);
                if self.state == ConnectionState::Connected {
                    self.send_now(&ClientFrame::LeaveConversation {
                        conversation_id: conversation,
                    })
                    .await;
                }
            }
            SupervisorCommand::Outbound(frame) => self.send_or_buffer(frame).await,
            SupervisorCommand::Shutdown => {}
        }
    }

    /// User-initiated connect.
    async fn connect(&mut self) -> Result<()> {
        let Some(session) = self.tokens.get() else {
            self.retry_at = None;
            self.teardown().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(ClientError::Realtime(
                "no access token; log in before connecting".into(),
            ));
        };

        match self.establish(session.access_token).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.retry_at = None;
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Tear down any live connection, then open a new one, refreshing the
    /// token once if the transport rejects it.
    async fn establish(&mut self, token: String) -> Result<()> {
        self.teardown().await;
        self.set_state(ConnectionState::Connecting);

        match self.open(token).await {
            Ok(()) => {
                self.after_connect().await;
                Ok(())
            }
            Err(SocketError::AuthRejected) => {
                tracing::info!("push channel rejected token; refreshing");
                // On failure this clears the session and emits the
                // logged-out event; we only propagate the error.
                let fresh = self.auth.refresh().await?;
                match self.open(fresh).await {
                    Ok(()) => {
                        self.after_connect().await;
                        Ok(())
                    }
                    Err(e) => Err(ClientError::Realtime(e.to_string())),
                }
            }
            Err(e) => Err(ClientError::Realtime(e.to_string())),
        }
    }

    async fn open(&mut self, token: String) -> std::result::Result<(), SocketError> {
        let (sink, stream) = self
            .transport
            .connect(&self.options.socket_url, &token)
            .await?;

        self.gen += 1;
        let reader = tokio::spawn(read_loop(stream, self.gen, self.inbound_tx.clone()));

        self.sink = Some(sink);
        self.reader = Some(reader);
        self.connected_token = Some(token);
        Ok(())
    }

    async fn after_connect(&mut self) {
        self.retry_at = None;
        self.set_state(ConnectionState::Connected);

        // Resume routing for tracked conversations, then flush anything
        // queued while the channel was down.
        let joined: Vec<ConversationId> = self.joined.iter().copied().collect();
        for conversation in joined {
            self.send_now(&ClientFrame::JoinConversation {
                conversation_id: conversation,
            })
            .await;
        }

        let mut pending = std::mem::take(&mut self.outbound);
        while let Some(frame) = pending.pop_front() {
            if !self.send_now(&frame).await {
                pending.push_front(frame);
                break;
            }
        }
        self.outbound = pending;
    }

    /// Deliberate local disconnect: no reconnect follows.
    async fn disconnect(&mut self) {
        self.retry_at = None;
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
    }

    async fn teardown(&mut self) {
        self.gen += 1;
        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.connected_token = None;
    }

    async fn handle_token_change(&mut self) {
        let session = self.token_rx.borrow_and_update().clone();
        match session {
            None => {
                // Logout: release resources and stay down.
                self.retry_at = None;
                if self.state != ConnectionState::Disconnected {
                    tracing::info!("session cleared; closing push channel");
                    self.teardown().await;
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            Some(session) => {
                let rotated =
                    self.connected_token.as_deref() != Some(session.access_token.as_str());
                let live = matches!(
                    self.state,
                    ConnectionState::Connected | ConnectionState::Connecting
                );
                if live && rotated {
                    tracing::info!("token rotated; rebinding push channel");
                    if let Err(e) = self.establish(session.access_token).await {
                        tracing::warn!(error = %e, "rebind failed; scheduling retry");
                        self.enter_reconnecting();
                    }
                }
            }
        }
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        if inbound.gen != self.gen {
            // A connection we already tore down.
            return;
        }
        match inbound.kind {
            InboundKind::Frame(frame) => self.apply_frame(frame),
            InboundKind::Closed(error) => {
                match error {
                    Some(e) => tracing::warn!(error = %e, "push channel dropped"),
                    None => tracing::info!("push channel closed by server"),
                }
                self.teardown().await;
                if matches!(
                    self.state,
                    ConnectionState::Connected | ConnectionState::Connecting
                ) {
                    self.enter_reconnecting();
                }
            }
        }
    }

    fn enter_reconnecting(&mut self) {
        self.set_state(ConnectionState::Reconnecting);
        self.retry_at = Some(Instant::now() + self.options.reconnect_delay);
    }

    async fn attempt_reconnect(&mut self) {
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        let Some(session) = self.tokens.get() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };
        match self.establish(session.access_token).await {
            Ok(()) => tracing::info!("push channel reconnected"),
            Err(ClientError::Unauthorized) => {
                // Refresh failed; the session is gone.  Stop retrying.
                self.retry_at = None;
                self.teardown().await;
                self.set_state(ConnectionState::Disconnected);
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect attempt failed");
                self.enter_reconnecting();
            }
        }
    }

    async fn send_now(&mut self, frame: &ClientFrame) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        match sink.send_frame(frame).await {
            Ok(()) => true,
            Err(e) => {
                // The reader will surface the close; just report failure.
                tracing::warn!(error = %e, "push send failed");
                false
            }
        }
    }

    async fn send_or_buffer(&mut self, frame: ClientFrame) {
        if self.state == ConnectionState::Connected && self.send_now(&frame).await {
            return;
        }
        if self.outbound.len() >= OUTBOUND_BUFFER_CAP {
            tracing::warn!("outbound buffer full; dropping oldest frame");
            self.outbound.pop_front();
        }
        self.outbound.push_back(frame);
    }

    /// Translate an inbound push event into cache mutations plus a client
    /// event.  Redeliveries after a reconnect apply exactly once.
    fn apply_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::NewMessage { message } => {
                let conversation_id = message.conversation_id;
                match self.cache.apply_new_message(message.clone()) {
                    AppliedMessage::Duplicate => {
                        tracing::debug!(id = %message.id, "duplicate push delivery ignored");
                    }
                    AppliedMessage::Inserted | AppliedMessage::Reconciled { .. } => {
                        self.events.emit(ClientEvent::MessageReceived {
                            conversation_id,
                            message,
                        });
                    }
                }
            }
            ServerFrame::MessageEdited {
                conversation_id,
                message_id,
                content,
                edited_at,
            } => {
                if self
                    .cache
                    .apply_edit(conversation_id, message_id, content, edited_at)
                {
                    self.events.emit(ClientEvent::MessageEdited {
                        conversation_id,
                        message_id,
                    });
                }
            }
            ServerFrame::MessageDeleted {
                conversation_id,
                message_id,
            } => {
                if self.cache.apply_delete(conversation_id, message_id) {
                    self.events.emit(ClientEvent::MessageDeleted {
                        conversation_id,
                        message_id,
                    });
                }
            }
            ServerFrame::Presence { user_id, online, at } => {
                self.cache.update_presence(Presence {
                    user_id,
                    online,
                    at,
                });
                self.events
                    .emit(ClientEvent::PresenceChanged { user_id, online });
            }
            ServerFrame::Typing {
                conversation_id,
                user_id,
            } => {
                self.cache.set_typing(conversation_id, user_id, true);
                self.events.emit(ClientEvent::TypingChanged {
                    conversation_id,
                    user_id,
                    typing: true,
                });
            }
            ServerFrame::StopTyping {
                conversation_id,
                user_id,
            } => {
                self.cache.set_typing(conversation_id, user_id, false);
                self.events.emit(ClientEvent::TypingChanged {
                    conversation_id,
                    user_id,
                    typing: false,
                });
            }
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = ?self.state, to = ?next, "push channel state");
        self.state = next;
        self.state_tx.send_replace(next);
        self.events.emit(ClientEvent::Connection(next));
    }
}

async fn read_loop(mut stream: Box<dyn SocketStream>, gen: u64, tx: mpsc::Sender<Inbound>) {
    loop {
        match stream.next_frame().await {
            Some(Ok(frame)) => {
                let inbound = Inbound {
                    gen,
                    kind: InboundKind::Frame(frame),
                };
                if tx.send(inbound).await.is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(Inbound {
                        gen,
                        kind: InboundKind::Closed(Some(e)),
                    })
                    .await;
                return;
            }
            None => {
                let _ = tx
                    .send(Inbound {
                        gen,
                        kind: InboundKind::Closed(None),
                    })
                    .await;
                return;
            }
        }
    }
}
