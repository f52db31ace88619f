//! # chorus-store
//!
//! Durable client-side storage for the chorus client: the persisted login
//! session (so a restart preserves authentication) and the invite
//! revocation side table (a local cache of server truth).
//!
//! The crate exposes a synchronous `Database` handle wrapping a
//! `rusqlite::Connection` with typed CRUD helpers.

pub mod database;
pub mod invites;
pub mod migrations;
pub mod models;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
