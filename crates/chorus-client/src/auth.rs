//! Auth session lifecycle: login flows, single-flight token refresh,
//! logout.
//!
//! The manager is the only writer of the token store.  Refresh is
//! single-flight per process: while one refresh is on the wire, every
//! concurrent caller awaits the same shared future and receives the same
//! outcome, so a second network refresh (which would race refresh-token
//! rotation on the server) can never be issued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;

use chorus_shared::types::Session;

use crate::api::auth::AuthApi;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventHub, LogoutReason};
use crate::tokens::TokenStore;

/// Refresh outcome shared between concurrent callers.  Cloneable so it can
/// travel through a [`Shared`] future.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no session to refresh")]
    NoSession,

    #[error("refresh token rejected")]
    Rejected,

    #[error("network error during refresh: {0}")]
    Transport(String),

    #[error("server error during refresh ({status})")]
    Server { status: u16 },
}

impl RefreshError {
    fn classify(e: &ClientError) -> Self {
        match e {
            ClientError::Unauthorized => RefreshError::Rejected,
            ClientError::Transport(msg) => RefreshError::Transport(msg.clone()),
            ClientError::Server { status, .. } => RefreshError::Server { status: *status },
            ClientError::NotFound => RefreshError::Server { status: 404 },
            other => RefreshError::Transport(other.to_string()),
        }
    }
}

impl From<RefreshError> for ClientError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::NoSession | RefreshError::Rejected => ClientError::Unauthorized,
            RefreshError::Transport(msg) => ClientError::Transport(msg),
            RefreshError::Server { status } => ClientError::Server {
                status,
                message: String::new(),
            },
        }
    }
}

type RefreshOutcome = std::result::Result<String, RefreshError>;
type RefreshFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Result of a code or credential login.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedLogin {
    /// Whether the server wants additional profile completion before the
    /// caller routes into the app proper.
    pub profile_complete: bool,
}

/// Result of processing an OAuth redirect callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthCallback {
    Completed { profile_complete: bool },
    /// The same redirect was already processed; nothing was stored and no
    /// second logged-in transition happened.
    AlreadyHandled,
}

pub struct AuthManager {
    api: Arc<dyn AuthApi>,
    tokens: Arc<TokenStore>,
    events: EventHub,
    /// Set before any logout teardown so `is_authenticated()` flips false
    /// immediately and a concurrent refresh failure stays silent.
    logging_out: Arc<AtomicBool>,
    /// One-shot guard: a redirect URL is revisited on re-render.
    oauth_handled: AtomicBool,
    refresh_gen: AtomicU64,
    refresh_flight: Mutex<Option<(u64, RefreshFlight)>>,
}

impl AuthManager {
    pub fn new(api: Arc<dyn AuthApi>, tokens: Arc<TokenStore>, events: EventHub) -> Self {
        Self {
            api,
            tokens,
            events,
            logging_out: Arc::new(AtomicBool::new(false)),
            oauth_handled: AtomicBool::new(false),
            refresh_gen: AtomicU64::new(0),
            refresh_flight: Mutex::new(None),
        }
    }

    /// True iff both tokens are present and no logout is in progress.
    pub fn is_authenticated(&self) -> bool {
        !self.logging_out.load(Ordering::SeqCst)
            && self.tokens.get().map(|s| s.is_complete()).unwrap_or(false)
    }

    /// Ask the server to send a one-time code.  No local state changes;
    /// failures are surfaced to the caller.
    pub async fn send_verification_code(&self, identifier: &str) -> Result<()> {
        let identifier = identifier.trim();
        if !looks_like_email(identifier) {
            return Err(ClientError::Validation(format!(
                "not an email address: {identifier:?}"
            )));
        }
        self.api.send_code(identifier).await
    }

    /// Exchange the emailed code for a session.
    pub async fn verify_code(&self, identifier: &str, code: &str) -> Result<VerifiedLogin> {
        if code.trim().is_empty() {
            return Err(ClientError::Validation("verification code is empty".into()));
        }
        let grant = self.api.verify_code(identifier, code).await?;
        self.install(Session {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
        })?;
        tracing::info!("logged in via verification code");
        Ok(VerifiedLogin {
            profile_complete: grant.profile_complete,
        })
    }

    /// Process an OAuth redirect callback.
    ///
    /// The redirect URL is revisited on re-render, so this must be safe to
    /// invoke more than once: only the first call stores the session.
    pub async fn login_with_oauth_callback(
        &self,
        access_token: String,
        refresh_token: String,
        profile_complete: bool,
    ) -> Result<OAuthCallback> {
        let session = Session {
            access_token,
            refresh_token,
        };
        if !session.is_complete() {
            return Err(ClientError::Validation(
                "OAuth callback is missing a token".into(),
            ));
        }
        if self.oauth_handled.swap(true, Ordering::SeqCst) {
            tracing::debug!("OAuth callback replay ignored");
            return Ok(OAuthCallback::AlreadyHandled);
        }
        self.install(session)?;
        tracing::info!("logged in via OAuth callback");
        Ok(OAuthCallback::Completed { profile_complete })
    }

    /// Credential login against the admin bypass endpoint.  Credentials go
    /// to the server for verification; nothing is compared client-side.
    pub async fn admin_bypass_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VerifiedLogin> {
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Validation("missing credentials".into()));
        }
        let grant = self.api.admin_login(username, password).await?;
        self.install(Session {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
        })?;
        tracing::info!(username, "logged in via admin bypass");
        Ok(VerifiedLogin {
            profile_complete: grant.profile_complete,
        })
    }

    /// Refresh the access token, returning the (possibly unchanged) token.
    ///
    /// Single-flight: concurrent callers share the in-flight request.  On
    /// failure the session is cleared and a logged-out event is emitted,
    /// unless a voluntary logout is already in progress.
    pub async fn refresh(&self) -> Result<String> {
        let (gen, flight) = {
            let mut slot = self.lock_flight();
            match slot.as_ref() {
                Some((gen, flight)) => (*gen, flight.clone()),
                None => {
                    let gen = self.refresh_gen.fetch_add(1, Ordering::SeqCst) + 1;
                    let flight = self.start_refresh();
                    *slot = Some((gen, flight.clone()));
                    (gen, flight)
                }
            }
        };

        let outcome = flight.await;

        // Whoever returns first retires this flight; later flights have a
        // different generation and are left alone.
        {
            let mut slot = self.lock_flight();
            if matches!(slot.as_ref(), Some((g, _)) if *g == gen) {
                *slot = None;
            }
        }

        outcome.map_err(ClientError::from)
    }

    fn start_refresh(&self) -> RefreshFlight {
        let api = Arc::clone(&self.api);
        let tokens = Arc::clone(&self.tokens);
        let events = self.events.clone();
        let logging_out = Arc::clone(&self.logging_out);

        async move {
            let Some(session) = tokens.get() else {
                return Err(RefreshError::NoSession);
            };
            match api.refresh(&session.refresh_token).await {
                Ok(pair) => {
                    tokens.set(Session {
                        access_token: pair.access_token.clone(),
                        refresh_token: pair.refresh_token,
                    });
                    tracing::debug!("access token refreshed");
                    Ok(pair.access_token)
                }
                Err(e) => {
                    let err = RefreshError::classify(&e);
                    if logging_out.load(Ordering::SeqCst) {
                        tracing::debug!(error = %e, "refresh failed during logout; ignored");
                    } else {
                        tracing::warn!(error = %e, "token refresh failed; ending session");
                        tokens.clear();
                        events.emit(ClientEvent::LoggedOut {
                            reason: LogoutReason::SessionExpired,
                        });
                    }
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Log out: guard flag first, then local teardown, then best-effort
    /// server notification.  The logged-out event fires regardless of the
    /// server call's outcome.
    pub async fn logout(&self) {
        self.logging_out.store(true, Ordering::SeqCst);
        self.oauth_handled.store(false, Ordering::SeqCst);

        let session = self.tokens.get();
        self.tokens.clear();

        if let Some(session) = session {
            if let Err(e) = self.api.logout(&session.access_token).await {
                tracing::warn!(error = %e, "server logout failed; session cleared locally");
            }
        }

        self.events.emit(ClientEvent::LoggedOut {
            reason: LogoutReason::UserRequested,
        });
    }

    /// Called when a request still fails auth after a successful refresh.
    pub fn session_expired(&self) {
        if self.logging_out.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!("session rejected after refresh; ending session");
        self.tokens.clear();
        self.events.emit(ClientEvent::LoggedOut {
            reason: LogoutReason::SessionExpired,
        });
    }

    fn install(&self, session: Session) -> Result<()> {
        if !session.is_complete() {
            return Err(ClientError::Validation(
                "server returned an incomplete token pair".into(),
            ));
        }
        self.logging_out.store(false, Ordering::SeqCst);
        self.tokens.set(session);
        Ok(())
    }

    fn lock_flight(&self) -> MutexGuard<'_, Option<(u64, RefreshFlight)>> {
        self.refresh_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shallow shape check: local part, one `@`, dotted domain.  Deliverability
/// is the server's problem.
fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty() && !s.contains(char::is_whitespace)
}
