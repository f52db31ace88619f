//! # chorus-client
//!
//! Headless client core for the Chorus team chat: authentication lifecycle
//! (OTP, OAuth callback, admin bypass, single-flight refresh), realtime
//! connection supervision, conversation/message caching with optimistic
//! sends, contacts and invites.  The crate has no UI dependency; an
//! embedding application subscribes to [`events::ClientEvent`]s and calls
//! into [`context::ClientContext`].

pub mod api;
pub mod auth;
pub mod cache;
pub mod chats;
pub mod config;
pub mod contacts;
pub mod context;
pub mod debounce;
pub mod events;
pub mod invites;
pub mod realtime;
pub mod socket;
pub mod tokens;
pub mod users;

mod error;

pub use config::ClientConfig;
pub use context::ClientContext;
pub use error::ClientError;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default tracing subscriber.  Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chorus_client=debug,chorus_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
