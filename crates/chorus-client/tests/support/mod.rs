//! Shared fakes for integration tests: a scriptable auth backend and a
//! scriptable socket transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chorus_client::api::auth::{AuthApi, LoginGrant, TokenPair};
use chorus_client::socket::{SocketError, SocketSink, SocketStream, SocketTransport};
use chorus_client::ClientError;
use chorus_shared::protocol::{ClientFrame, ServerFrame};

// ---------------------------------------------------------------------------
// Auth backend fake
// ---------------------------------------------------------------------------

pub struct FakeAuthApi {
    pub send_code_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// Simulated network latency for refresh, so concurrent callers
    /// overlap a single flight.
    pub refresh_delay: Duration,
    pub fail_refresh: AtomicBool,
    pub fail_logout: AtomicBool,
    pub profile_complete: bool,
}

impl FakeAuthApi {
    pub fn new() -> Self {
        Self {
            send_code_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_delay: Duration::from_millis(50),
            fail_refresh: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            profile_complete: true,
        }
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn send_code(&self, _identifier: &str) -> Result<(), ClientError> {
        self.send_code_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn verify_code(&self, _identifier: &str, code: &str) -> Result<LoginGrant, ClientError> {
        if code == "000000" {
            return Err(ClientError::Unauthorized);
        }
        Ok(LoginGrant {
            access_token: format!("access-{code}"),
            refresh_token: format!("refresh-{code}"),
            profile_complete: self.profile_complete,
        })
    }

    async fn admin_login(&self, username: &str, _password: &str) -> Result<LoginGrant, ClientError> {
        Ok(LoginGrant {
            access_token: format!("access-admin-{username}"),
            refresh_token: format!("refresh-admin-{username}"),
            profile_complete: true,
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ClientError> {
        tokio::time::sleep(self.refresh_delay).await;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized);
        }
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenPair {
            access_token: format!("access-r{n}"),
            refresh_token: format!("refresh-r{n}"),
        })
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("logout endpoint down".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Socket transport fake
// ---------------------------------------------------------------------------

/// What the next scripted `connect` should do (default: accept).
#[derive(Debug, Clone, Copy)]
pub enum ScriptedConnect {
    Accept,
    RejectAuth,
    Fail,
}

pub enum FakeItem {
    Frame(ServerFrame),
    /// Server-initiated close.
    Drop,
}

struct LiveGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeTransport {
    script: Mutex<VecDeque<ScriptedConnect>>,
    /// Access tokens presented to `connect`, in order.
    pub connects: Mutex<Vec<String>>,
    /// Currently live connections (both halves still alive).
    pub live: Arc<AtomicUsize>,
    pub max_live: Arc<AtomicUsize>,
    /// Frames the supervisor sent, across all connections.
    pub sent: Arc<Mutex<Vec<ClientFrame>>>,
    controls: Mutex<Vec<mpsc::UnboundedSender<FakeItem>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            controls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, outcomes: &[ScriptedConnect]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn connect_tokens(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent.lock().unwrap().clone()
    }

    /// Control handle for the most recent accepted connection.
    pub fn last_control(&self) -> mpsc::UnboundedSender<FakeItem> {
        self.controls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no accepted connection yet")
    }

    pub fn push_frame(&self, frame: ServerFrame) {
        self.last_control()
            .send(FakeItem::Frame(frame))
            .expect("connection gone");
    }

    pub fn drop_connection(&self) {
        let _ = self.last_control().send(FakeItem::Drop);
    }
}

#[async_trait]
impl SocketTransport for FakeTransport {
    async fn connect(
        &self,
        _url: &str,
        access_token: &str,
    ) -> Result<(Box<dyn SocketSink>, Box<dyn SocketStream>), SocketError> {
        self.connects.lock().unwrap().push(access_token.to_string());

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedConnect::Accept);

        match outcome {
            ScriptedConnect::RejectAuth => Err(SocketError::AuthRejected),
            ScriptedConnect::Fail => Err(SocketError::Connect("scripted failure".into())),
            ScriptedConnect::Accept => {
                let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_live.fetch_max(live, Ordering::SeqCst);
                let guard = Arc::new(LiveGuard {
                    live: Arc::clone(&self.live),
                });

                let (tx, rx) = mpsc::unbounded_channel();
                self.controls.lock().unwrap().push(tx);

                Ok((
                    Box::new(FakeSink {
                        sent: Arc::clone(&self.sent),
                        _guard: Arc::clone(&guard),
                    }),
                    Box::new(FakeStream { rx, _guard: guard }),
                ))
            }
        }
    }
}

struct FakeSink {
    sent: Arc<Mutex<Vec<ClientFrame>>>,
    _guard: Arc<LiveGuard>,
}

#[async_trait]
impl SocketSink for FakeSink {
    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<(), SocketError> {
        self.sent.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn close(&mut self) {}
}

struct FakeStream {
    rx: mpsc::UnboundedReceiver<FakeItem>,
    _guard: Arc<LiveGuard>,
}

#[async_trait]
impl SocketStream for FakeStream {
    async fn next_frame(&mut self) -> Option<Result<ServerFrame, SocketError>> {
        match self.rx.recv().await {
            Some(FakeItem::Frame(frame)) => Some(Ok(frame)),
            Some(FakeItem::Drop) | None => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Poll until `check` holds; panics after the (virtual) deadline.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
