//! Constants for the streaming connection engine.
//!
//! Contains default endpoints, environment variable names, and the few
//! timing constants the wire protocol leaves implementation-defined.

// ---------------------------------------------------------------------------
// Base URLs
// ---------------------------------------------------------------------------

/// Default base websocket URL for the equities feed.
///
/// The active feed tag (`iex`, `sip`, …) is appended as a path segment by
/// [`crate::config::StreamConfig::endpoint_url`].
pub const DEFAULT_EQUITIES_BASE_URL: &str = "wss://stream.data.example.com/v2";

/// Default base websocket URL for the crypto feed. Crypto has no feed tag.
pub const DEFAULT_CRYPTO_BASE_URL: &str = "wss://stream.data.example.com/v1beta3/crypto/us";

/// Feed tags accepted for the equities endpoint.
pub const EQUITIES_FEEDS: &[&str] = &["iex", "sip", "delayed_sip", "boats", "overnight"];

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Environment variable overriding the default base URL at client
/// construction time.
pub const ENV_BASE_URL: &str = "DATA_PROXY_WS";

/// Environment variable for the API key, used when credentials are not
/// supplied directly to the configuration builder.
pub const ENV_KEY_ID: &str = "DATA_PROXY_KEY";

/// Environment variable for the API secret.
pub const ENV_SECRET_KEY: &str = "DATA_PROXY_SECRET";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default inbound queue capacity (records buffered between the reader and
/// the processor pool).
pub const DEFAULT_BUFFER_SIZE: usize = 100_000;

/// Default number of parallel message processors.
pub const DEFAULT_PROCESSOR_COUNT: usize = 1;

/// Default reconnect delay, multiplied by the consecutive-failure count.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Default reconnect attempt limit. `0` means unlimited.
pub const DEFAULT_RECONNECT_LIMIT: u32 = 0;

/// Interval between outbound pings on an active session. The wire protocol
/// leaves the exact cadence implementation-defined; 10s is a conservative
/// keep-alive interval.
pub const PING_INTERVAL_SECS: u64 = 10;
