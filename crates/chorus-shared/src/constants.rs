/// Application name
pub const APP_NAME: &str = "Chorus";

/// Default number of messages fetched per history page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Fixed delay between realtime reconnect attempts, in seconds
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;

/// Debounce window for search / availability lookups, in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Window within which a server echo is matched against a locally
/// optimistic message that has no server-assigned id yet, in milliseconds
pub const OPTIMISTIC_ECHO_WINDOW_MS: i64 = 2_000;

/// Default invite validity when the issuer does not pick one, in days
pub const DEFAULT_INVITE_EXPIRATION_DAYS: u32 = 7;

/// Maximum text message length accepted client-side, in bytes
pub const MAX_MESSAGE_SIZE: usize = 65_536;
