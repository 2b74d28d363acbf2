//! # streamfeed
//!
//! A connection-lifecycle engine for an authenticated, subscription-driven
//! real-time market-data stream: trades, quotes, minute bars, daily bars,
//! and trading status, delivered over a single long-lived websocket
//! connection that reconnects transparently and replays the caller's
//! subscriptions after every transport failure.
//!
//! ## Quick start
//!
//! ```no_run
//! use streamfeed::config::EquitiesClientBuilder;
//! use streamfeed::client::EquitiesClient;
//!
//! # #[tokio::main]
//! # async fn main() -> streamfeed::Result<()> {
//! let config = EquitiesClientBuilder::default()
//!     .feed("iex")
//!     .on_trade(|trade| println!("{trade:?}"))
//!     .build()?;
//! let mut client = EquitiesClient::new(config);
//! client.connect().await?;
//! client.subscribe_trades(["AAPL", "MSFT"]).await?;
//! client.terminated().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod handshake;
pub mod record;
pub mod session;
pub mod subscription;
pub mod supervisor;
pub mod ticker;
pub mod transport;

pub use client::{CryptoClient, EquitiesClient};
pub use error::{Result, StreamError};
