//! Session-scoped wiring.
//!
//! [`ClientContext`] replaces ambient globals with one explicitly owned
//! object graph: the token store owns tokens, the cache owns messages, the
//! supervisor owns the push channel, and everything is reachable from the
//! context handed to the embedding application.

use std::sync::Arc;

use chorus_store::Database;

use crate::api::auth::{AuthApi, HttpAuthApi};
use crate::api::ApiClient;
use crate::auth::AuthManager;
use crate::cache::ChatCache;
use crate::chats::Chats;
use crate::config::ClientConfig;
use crate::contacts::ContactService;
use crate::error::{ClientError, Result};
use crate::events::EventHub;
use crate::invites::InviteRegistry;
use crate::realtime::{spawn_supervisor, RealtimeHandle, RealtimeOptions};
use crate::socket::WsTransport;
use crate::tokens::TokenStore;
use crate::users::UserDirectory;

pub struct ClientContext {
    pub config: ClientConfig,
    pub db: Arc<Database>,
    pub events: EventHub,
    pub tokens: Arc<TokenStore>,
    pub auth: Arc<AuthManager>,
    pub api: Arc<ApiClient>,
    pub cache: Arc<ChatCache>,
    pub realtime: Arc<RealtimeHandle>,
    pub users: Arc<UserDirectory>,
    pub chats: Chats,
    pub contacts: ContactService,
    pub invites: InviteRegistry,
}

impl ClientContext {
    /// Wire up a full client against the default local database.
    ///
    /// Must be called from within a tokio runtime; the realtime supervisor
    /// is spawned immediately (in its `Disconnected` state).
    pub fn initialize(config: ClientConfig) -> Result<Self> {
        let db = Arc::new(Database::new()?);
        Self::with_database(config, db)
    }

    /// Wire up a full client against an explicit database (tests, custom
    /// layouts).
    pub fn with_database(config: ClientConfig, db: Arc<Database>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chorus-client/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let events = EventHub::new();
        let tokens = Arc::new(TokenStore::new(Some(db.clone())));

        let auth_api: Arc<dyn AuthApi> =
            Arc::new(HttpAuthApi::new(http.clone(), config.api_base_url.clone()));
        let auth = Arc::new(AuthManager::new(auth_api, tokens.clone(), events.clone()));

        let api = Arc::new(ApiClient::new(
            &config,
            http,
            tokens.clone(),
            auth.clone(),
        ));
        let cache = Arc::new(ChatCache::new());

        let realtime = Arc::new(spawn_supervisor(
            RealtimeOptions::from_config(&config),
            Arc::new(WsTransport),
            auth.clone(),
            tokens.clone(),
            cache.clone(),
            events.clone(),
        ));

        let users = Arc::new(UserDirectory::new(api.clone()));
        let chats = Chats::new(
            api.clone(),
            cache.clone(),
            realtime.clone(),
            users.clone(),
            config.page_size,
        );
        let contacts = ContactService::new(
            api.clone(),
            cache.clone(),
            events.clone(),
            config.debounce_interval,
        );
        let invites = InviteRegistry::new(db.clone());

        tracing::info!(api = %config.api_base_url, socket = %config.socket_url, "client context ready");

        Ok(Self {
            config,
            db,
            events,
            tokens,
            auth,
            api,
            cache,
            realtime,
            users,
            chats,
            contacts,
            invites,
        })
    }

    /// Release background resources: pending debounce timers and the
    /// supervisor task.
    pub async fn shutdown(&self) {
        self.contacts.cancel_pending();
        self.realtime.shutdown().await;
    }
}
