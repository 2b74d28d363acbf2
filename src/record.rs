//! Decoded wire records.
//!
//! A single inbound frame is an array of heterogeneous, self-describing
//! maps. [`Record`] is what [`crate::codec::Codec::decode`] turns each map
//! into once its `T` tag has been read.

/// One decoded record from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// `T: "success"` — a control acknowledgement, e.g. the welcome frame
    /// or an `authenticated` confirmation.
    Success(SuccessMessage),
    /// `T: "error"` — a server-reported error, already classified.
    ErrorFrame(ErrorMessage),
    /// `T: "subscription"` — the server's committed subscription set,
    /// returned after every `subscribe`/`unsubscribe`/`listen` request.
    SubscriptionAck(SubscriptionAck),
    Trade(Trade),
    Quote(Quote),
    Bar(Bar),
    DailyBar(Bar),
    Status(Status),
    /// A record whose `T` tag is not recognized. Logged and dropped by the
    /// session's processor loop rather than treated as an error.
    Unknown { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessMessage {
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscriptionAck {
    pub trades: Vec<String>,
    pub quotes: Vec<String>,
    pub bars: Vec<String>,
    pub daily_bars: Vec<String>,
    pub statuses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub timestamp: String,
    pub exchange: String,
    pub trade_id: i64,
    pub tape: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_size: f64,
    pub bid_exchange: String,
    pub ask_price: f64,
    pub ask_size: f64,
    pub ask_exchange: String,
    pub timestamp: String,
    pub tape: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub symbol: String,
    pub status_code: String,
    pub status_message: String,
    pub reason_code: String,
    pub reason_message: String,
    pub timestamp: String,
    pub tape: String,
}
