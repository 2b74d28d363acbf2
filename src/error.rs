//! Error types for the `streamfeed` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, StreamError>`.
//!
//! [`StreamError`] covers:
//! - **Handshake errors** — the welcome/auth exchange
//! - **Subscription-coordinator errors** — contract violations around the
//!   single pending subscription-change slot
//! - **Server error-code mappings** — numeric `error` frames translated per
//!   the code table
//! - **Lifecycle errors** — `Connect` called more than once, retries
//!   exhausted
//! - **Transport / decode errors** — wrapped failures from the underlying
//!   websocket or frame codec

use std::fmt;

/// All possible errors produced by the `streamfeed` client.
///
/// Every variant is a distinct, matchable identity — callers are expected to
/// `match` on this enum rather than inspect the `Display` text.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The server never produced the initial `success{msg:"connected"}`
    /// welcome frame. Irrecoverable.
    #[error("server did not send the expected welcome frame")]
    NoConnected,

    /// An already-established session's transport closed cleanly (or was
    /// reset) mid-flight. Recoverable — the supervisor opens a new socket
    /// and replays the last committed subscription set.
    #[error("transport closed")]
    TransportClosed,

    /// Authentication was rejected by the server (codes 401/402/404).
    /// Irrecoverable.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An unexpected frame followed the `auth` request. Irrecoverable.
    #[error("unexpected response to auth request: {0}")]
    BadAuthResponse(String),

    /// `Connect` was called more than once on the same client.
    #[error("Connect was already called on this client")]
    ConnectCalledMultipleTimes,

    /// A subscription change was requested before `Connect` completed.
    #[error("subscription change requested before Connect")]
    SubscriptionChangeBeforeConnect,

    /// A subscription change was requested after the client terminated.
    #[error("subscription change requested after the client terminated")]
    SubscriptionChangeAfterTerminated,

    /// A second subscription change was requested while one was already in
    /// flight. At most one pending change may exist at a time.
    #[error("a subscription change is already in progress")]
    SubscriptionChangeAlreadyInProgress,

    /// The session ended (or the caller cancelled) before the server
    /// acknowledged a pending subscription change. The desired state is
    /// carried forward into the next handshake regardless.
    #[error("subscription change was interrupted")]
    SubscriptionChangeInterrupted,

    /// Server error code 405: too many symbols requested on one channel.
    /// Recoverable — the session stays alive.
    #[error("symbol limit exceeded: {0}")]
    SymbolLimitExceeded(String),

    /// Server error code 406: too many concurrent connections for this
    /// account. Irrecoverable.
    #[error("connection limit exceeded: {0}")]
    ConnectionLimitExceeded(String),

    /// Server error code 407: the client is not draining its inbound queue
    /// fast enough. Recoverable.
    #[error("slow client: {0}")]
    SlowClient(String),

    /// Server error code 408: the account's plan does not cover the
    /// requested symbols/channel. Recoverable.
    #[error("insufficient subscription: {0}")]
    InsufficientSubscription(String),

    /// An `error` frame with a code outside the mapped table. Carries the
    /// raw code and message.
    #[error("server error {code}: {message}")]
    ServerError {
        /// The raw numeric error code from the `error` frame.
        code: i64,
        /// The server-supplied message text.
        message: String,
    },

    /// The reconnect loop exhausted its configured retry budget. Wraps the
    /// last session-ending error.
    #[error("reconnect attempts exhausted after {attempts} tries: {source}")]
    RetriesExhausted {
        /// Number of consecutive failed attempts before giving up.
        attempts: u32,
        /// The error that ended the final attempt.
        #[source]
        source: Box<StreamError>,
    },

    /// The caller's cancellation scope was cancelled.
    #[error("cancelled by caller")]
    Cancelled,

    /// The caller supplied an invalid configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A websocket transport error.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame failed to decode.
    #[error("frame decode error: {0}")]
    Decode(String),

    /// A frame failed to encode.
    #[error("frame encode error: {0}")]
    Encode(String),

    /// A malformed base URL was supplied.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}

impl StreamError {
    /// Whether this error must terminate the client rather than trigger a
    /// reconnect attempt.
    pub fn is_irrecoverable(&self) -> bool {
        matches!(
            self,
            StreamError::NoConnected
                | StreamError::InvalidCredentials
                | StreamError::BadAuthResponse(_)
                | StreamError::ConnectionLimitExceeded(_)
        )
    }
}

/// Error response carried by a server `error` frame.
#[derive(Debug, Clone)]
pub struct ServerErrorFrame {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ServerErrorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Map a server error code to a [`StreamError`].
///
/// The returned error's [`StreamError::is_irrecoverable`] reflects the
/// "Recoverable" column of the error-code table exactly.
pub fn map_error_code(frame: &ServerErrorFrame) -> StreamError {
    match frame.code {
        401 | 402 | 404 => StreamError::InvalidCredentials,
        405 => StreamError::SymbolLimitExceeded(frame.message.clone()),
        406 => StreamError::ConnectionLimitExceeded(frame.message.clone()),
        407 => StreamError::SlowClient(frame.message.clone()),
        408 => StreamError::InsufficientSubscription(frame.message.clone()),
        other => StreamError::ServerError {
            code: other,
            message: frame.message.clone(),
        },
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StreamError>;
