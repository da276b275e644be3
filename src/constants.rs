//! Documented constants for the guard subsystem
//!
//! Every tunable default lives here so the config layer and the tests agree on
//! the same numbers. Runtime overrides go through `config::ServerConfig`.

// =============================================================================
// QUOTA CONSTANTS
// =============================================================================

/// Lifetime query allowance for an anonymous session
///
/// Counted over the whole ledger history of a session token and never reset.
/// Once reached, the session is permanently locked and must register.
pub const ANONYMOUS_LIFETIME_LIMIT: u32 = 5;

/// Daily query allowance for a registered user
///
/// Counted from 00:00 UTC of the current day. Rollover needs no explicit reset
/// because the count is always taken "since midnight".
pub const REGISTERED_DAILY_LIMIT: u32 = 10;

// =============================================================================
// CONVERSATIONAL MEMORY CONSTANTS
// =============================================================================

/// Maximum turns held in a conversation buffer (20 user/assistant exchanges)
pub const MEMORY_CAPACITY: usize = 40;

/// Upper bound on per-identity buffers kept in process
///
/// Idle buffers beyond this are evicted least-recently-used first.
pub const MAX_LIVE_BUFFERS: u64 = 10_000;

/// Idle time after which a per-identity buffer is dropped (seconds)
///
/// Matches the anonymous session cookie lifetime.
pub const BUFFER_IDLE_SECS: u64 = 86_400;

// =============================================================================
// LEAKAGE GUARD CONSTANTS
// =============================================================================

/// A reply is leaked when more than this many distinct denylist terms occur
///
/// One incidental hit is tolerated.
pub const LEAKAGE_TOLERANCE: usize = 1;

/// Number of most recent assistant turns scanned for poisoning before a call
pub const POISON_SCAN_WINDOW: usize = 3;

// =============================================================================
// SESSION CARRIER CONSTANTS
// =============================================================================

/// Cookie carrying the anonymous session token
pub const SESSION_COOKIE: &str = "session_id";

/// Cookie carrying the advisory lockout marker
pub const LOCKOUT_COOKIE: &str = "limit_reached";

/// Anonymous session cookie lifetime (24 hours)
pub const SESSION_COOKIE_MAX_AGE_SECS: u64 = 86_400;

/// Lockout marker lifetime (one year, effectively permanent)
pub const LOCKOUT_COOKIE_MAX_AGE_SECS: u64 = 31_536_000;

/// Random bytes in a minted session token (128 bits)
pub const SESSION_TOKEN_BYTES: usize = 16;

// =============================================================================
// PROVIDER CONSTANTS
// =============================================================================

/// Default provider request timeout (seconds)
pub const PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Sampling temperature sent with every completion request
pub const PROVIDER_TEMPERATURE: f32 = 0.7;

/// Completion token cap sent with every request
pub const PROVIDER_MAX_TOKENS: u32 = 1500;
