//! Client configuration and its builders.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::constants::{
    DEFAULT_BUFFER_SIZE, DEFAULT_CRYPTO_BASE_URL, DEFAULT_EQUITIES_BASE_URL,
    DEFAULT_PROCESSOR_COUNT, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_RECONNECT_LIMIT, ENV_BASE_URL,
    EQUITIES_FEEDS, PING_INTERVAL_SECS,
};
use crate::credentials::Credentials;
use crate::error::{Result, StreamError};
use crate::session::HandlerSet;
use crate::subscription::SubscriptionSet;

/// Which family of endpoint a client targets. Only affects URL
/// composition and which channels are legal (§3: crypto has no
/// `statuses` channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Market {
    Equities,
    Crypto,
}

/// Fully resolved, immutable client configuration.
pub struct StreamConfig {
    pub(crate) market: Market,
    pub(crate) base_url: Url,
    pub(crate) feed: Option<String>,
    pub(crate) credentials: Credentials,
    pub(crate) buffer_size: usize,
    pub(crate) processor_count: usize,
    pub(crate) reconnect_delay: Duration,
    pub(crate) reconnect_limit: u32,
    pub(crate) ping_interval: Duration,
    pub(crate) handlers: Arc<HandlerSet>,
    pub(crate) initial_subscription: SubscriptionSet,
}

impl StreamConfig {
    /// The final websocket URL, feed suffix applied for equities.
    pub fn endpoint_url(&self) -> Url {
        match (&self.market, &self.feed) {
            (Market::Equities, Some(feed)) => {
                let mut url = self.base_url.clone();
                let mut segments = url.path().trim_end_matches('/').to_string();
                segments.push('/');
                segments.push_str(feed);
                url.set_path(&segments);
                url
            }
            _ => self.base_url.clone(),
        }
    }
}

fn resolve_base_url(market: Market, override_url: Option<Url>) -> Result<Url> {
    if let Some(url) = override_url {
        return Ok(url);
    }
    if let Ok(from_env) = std::env::var(ENV_BASE_URL) {
        if !from_env.is_empty() {
            return Url::parse(&from_env).map_err(StreamError::from);
        }
    }
    let default = match market {
        Market::Equities => DEFAULT_EQUITIES_BASE_URL,
        Market::Crypto => DEFAULT_CRYPTO_BASE_URL,
    };
    Url::parse(default).map_err(StreamError::from)
}

/// Shared builder state; the two public builders below wrap this with a
/// market tag so equities-only knobs (the feed tag) don't leak into the
/// crypto builder's API.
struct BuilderState {
    base_url: Option<Url>,
    feed: Option<String>,
    credentials: Option<Credentials>,
    buffer_size: usize,
    processor_count: usize,
    reconnect_delay: Duration,
    reconnect_limit: u32,
    ping_interval: Duration,
    handlers: HandlerSet,
    initial_subscription: SubscriptionSet,
}

impl Default for BuilderState {
    fn default() -> Self {
        Self {
            base_url: None,
            feed: None,
            credentials: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            processor_count: DEFAULT_PROCESSOR_COUNT,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            reconnect_limit: DEFAULT_RECONNECT_LIMIT,
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            handlers: HandlerSet::default(),
            initial_subscription: SubscriptionSet::new(),
        }
    }
}

impl BuilderState {
    fn build(self, market: Market) -> Result<StreamConfig> {
        let credentials = match self.credentials {
            Some(c) => c,
            None => Credentials::from_env()?,
        };
        Ok(StreamConfig {
            market,
            base_url: resolve_base_url(market, self.base_url)?,
            feed: self.feed,
            credentials,
            buffer_size: self.buffer_size,
            processor_count: self.processor_count,
            reconnect_delay: self.reconnect_delay,
            reconnect_limit: self.reconnect_limit,
            ping_interval: self.ping_interval,
            handlers: Arc::new(self.handlers),
            initial_subscription: self.initial_subscription,
        })
    }
}

macro_rules! common_builder_methods {
    () => {
        /// Override the websocket base URL instead of using the default
        /// or the `DATA_PROXY_WS` environment variable.
        pub fn base_url(mut self, url: Url) -> Self {
            self.state.base_url = Some(url);
            self
        }

        /// Supply credentials directly instead of reading them from the
        /// environment at [`Self::build`] time.
        pub fn credentials(mut self, credentials: Credentials) -> Self {
            self.state.credentials = Some(credentials);
            self
        }

        /// Inbound processor-queue capacity. Default 100,000.
        pub fn buffer_size(mut self, size: usize) -> Self {
            self.state.buffer_size = size;
            self
        }

        /// Number of parallel record-dispatch tasks. Default 1.
        pub fn processor_count(mut self, count: usize) -> Self {
            self.state.processor_count = count;
            self
        }

        /// Base reconnect delay, multiplied by the consecutive-failure
        /// count. Default 1s.
        pub fn reconnect_delay(mut self, delay: Duration) -> Self {
            self.state.reconnect_delay = delay;
            self
        }

        /// Maximum consecutive reconnect failures before giving up. `0`
        /// (the default) means unlimited.
        pub fn reconnect_limit(mut self, limit: u32) -> Self {
            self.state.reconnect_limit = limit;
            self
        }

        /// Interval between keep-alive pings on an active session.
        pub fn ping_interval(mut self, interval: Duration) -> Self {
            self.state.ping_interval = interval;
            self
        }

        /// Register the trade-record callback.
        pub fn on_trade<F>(mut self, f: F) -> Self
        where
            F: Fn(crate::record::Trade) + Send + Sync + 'static,
        {
            self.state.handlers.on_trade = Some(std::sync::Arc::new(f));
            self
        }

        /// Register the quote-record callback.
        pub fn on_quote<F>(mut self, f: F) -> Self
        where
            F: Fn(crate::record::Quote) + Send + Sync + 'static,
        {
            self.state.handlers.on_quote = Some(std::sync::Arc::new(f));
            self
        }

        /// Register the minute-bar callback.
        pub fn on_bar<F>(mut self, f: F) -> Self
        where
            F: Fn(crate::record::Bar) + Send + Sync + 'static,
        {
            self.state.handlers.on_bar = Some(std::sync::Arc::new(f));
            self
        }

        /// Register the daily-bar callback.
        pub fn on_daily_bar<F>(mut self, f: F) -> Self
        where
            F: Fn(crate::record::Bar) + Send + Sync + 'static,
        {
            self.state.handlers.on_daily_bar = Some(std::sync::Arc::new(f));
            self
        }

        /// Symbols to subscribe to trades for as part of the initial
        /// handshake, before `Connect` returns.
        pub fn initial_trades<I, S>(mut self, symbols: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            self.state
                .initial_subscription
                .add_trades(symbols.into_iter().map(|s| s.as_ref().to_string()));
            self
        }

        /// Symbols to subscribe to quotes for as part of the initial
        /// handshake, before `Connect` returns.
        pub fn initial_quotes<I, S>(mut self, symbols: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            self.state
                .initial_subscription
                .add_quotes(symbols.into_iter().map(|s| s.as_ref().to_string()));
            self
        }

        /// Symbols to subscribe to minute bars for as part of the initial
        /// handshake, before `Connect` returns.
        pub fn initial_bars<I, S>(mut self, symbols: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            self.state
                .initial_subscription
                .add_bars(symbols.into_iter().map(|s| s.as_ref().to_string()));
            self
        }

        /// Symbols to subscribe to daily bars for as part of the initial
        /// handshake, before `Connect` returns.
        pub fn initial_daily_bars<I, S>(mut self, symbols: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            self.state
                .initial_subscription
                .add_daily_bars(symbols.into_iter().map(|s| s.as_ref().to_string()));
            self
        }
    };
}

/// Builder for [`crate::client::EquitiesClient`].
#[derive(Default)]
pub struct EquitiesClientBuilder {
    state: BuilderState,
}

impl EquitiesClientBuilder {
    common_builder_methods!();

    /// Select a feed tag (`iex`, `sip`, `delayed_sip`, `boats`,
    /// `overnight`). Returns `InvalidArgument` from [`Self::build`] if the
    /// tag isn't one of those.
    pub fn feed(mut self, feed: impl Into<String>) -> Self {
        self.state.feed = Some(feed.into());
        self
    }

    /// Register the trading-status callback, equities-only.
    pub fn on_status<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::record::Status) + Send + Sync + 'static,
    {
        self.state.handlers.on_status = Some(Arc::new(f));
        self
    }

    /// Symbols to subscribe to trading status for as part of the initial
    /// handshake, before `Connect` returns. Equities-only.
    pub fn initial_statuses<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state
            .initial_subscription
            .add_statuses(symbols.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn build(self) -> Result<StreamConfig> {
        if let Some(feed) = &self.state.feed {
            if !EQUITIES_FEEDS.contains(&feed.as_str()) {
                return Err(StreamError::InvalidArgument(format!(
                    "unknown equities feed {feed:?}, expected one of {EQUITIES_FEEDS:?}"
                )));
            }
        }
        self.state.build(Market::Equities)
    }
}

/// Builder for [`crate::client::CryptoClient`]. Crypto has no feed tag and
/// no trading-status channel.
#[derive(Default)]
pub struct CryptoClientBuilder {
    state: BuilderState,
}

impl CryptoClientBuilder {
    common_builder_methods!();

    pub fn build(self) -> Result<StreamConfig> {
        self.state.build(Market::Crypto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equities_builder_rejects_unknown_feed() {
        let result = EquitiesClientBuilder::default()
            .credentials(Credentials::new("k", "s"))
            .feed("bogus")
            .build();
        assert!(matches!(result, Err(StreamError::InvalidArgument(_))));
    }

    #[test]
    fn equities_builder_composes_feed_into_url() {
        let config = EquitiesClientBuilder::default()
            .credentials(Credentials::new("k", "s"))
            .base_url(Url::parse("wss://example.test/v2").unwrap())
            .feed("sip")
            .build()
            .unwrap();
        assert_eq!(config.endpoint_url().as_str(), "wss://example.test/v2/sip");
    }

    #[test]
    fn initial_symbol_sets_flow_into_config() {
        let config = EquitiesClientBuilder::default()
            .credentials(Credentials::new("k", "s"))
            .initial_trades(["al", "paca"])
            .initial_statuses(["AAPL"])
            .build()
            .unwrap();
        assert!(config.initial_subscription.trades.contains("AL"));
        assert!(config.initial_subscription.trades.contains("PACA"));
        assert!(config.initial_subscription.statuses.contains("AAPL"));
    }

    #[test]
    fn crypto_builder_ignores_feed_concept_entirely() {
        let config = CryptoClientBuilder::default()
            .credentials(Credentials::new("k", "s"))
            .base_url(Url::parse("wss://example.test/v1beta3/crypto/us").unwrap())
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint_url().as_str(),
            "wss://example.test/v1beta3/crypto/us"
        );
    }
}
