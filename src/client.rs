//! Public façade: [`EquitiesClient`] and [`CryptoClient`].
//!
//! Both share [`ClientCore`], which owns the supervisor handle and exposes
//! the subscription methods; they differ only in which channels they
//! expose (equities adds trading-status) and in how their config builder
//! composes a URL.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::codec::MsgPackCodec;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::supervisor::{ClientState, ReconnectPolicy, Supervisor, SupervisorHandle};
use crate::subscription::SubscriptionSet;
use crate::ticker::LinearBackoff;
use crate::transport::WebSocketTransport;

/// Point-in-time connection diagnostics. Pure introspection; does not
/// affect the state machine.
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    pub state: ClientState,
    pub consecutive_failures_reported: bool,
}

/// Shared implementation behind both public client types.
pub struct ClientCore {
    handle: Option<SupervisorHandle>,
    config: StreamConfig,
}

impl ClientCore {
    fn new(config: StreamConfig) -> Self {
        Self {
            handle: None,
            config,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(StreamError::ConnectCalledMultipleTimes);
        }
        let url = self.config.endpoint_url();
        let factory = WebSocketTransport::factory(url);
        let codec = Arc::new(MsgPackCodec::new());
        let cancel = CancellationToken::new();

        let handle = Supervisor::connect(
            factory,
            codec,
            self.config.credentials.clone(),
            self.config.handlers.clone(),
            self.config.initial_subscription.clone(),
            ReconnectPolicy {
                delay: Arc::new(LinearBackoff::new(self.config.reconnect_delay)),
                limit: self.config.reconnect_limit,
            },
            crate::session::SessionParams::new(
                self.config.buffer_size,
                self.config.processor_count,
                self.config.ping_interval,
            ),
            cancel,
        )
        .await?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Block until the client terminates, returning the cause (`None` for
    /// a caller-initiated shutdown).
    async fn terminated(&mut self) -> Option<StreamError> {
        let Some(handle) = &mut self.handle else {
            return None;
        };
        (&mut handle.terminated_rx).await.ok().flatten()
    }

    async fn change(&self, mutate: impl FnOnce(&mut SubscriptionSet)) -> Result<SubscriptionSet> {
        match &self.handle {
            None => Err(StreamError::SubscriptionChangeBeforeConnect),
            Some(handle) => handle.router.submit(mutate).await,
        }
    }

    /// Read-only connection diagnostics.
    pub fn health(&self) -> ConnectionHealth {
        let state = self
            .handle
            .as_ref()
            .map(|h| *h.state_rx.borrow())
            .unwrap_or(ClientState::Created);
        ConnectionHealth {
            state,
            consecutive_failures_reported: false,
        }
    }

    /// Gracefully close the connection: the running session is cancelled
    /// and `terminated()` resolves with `None`.
    pub fn shutdown(&self) {
        if let Some(handle) = &self.handle {
            handle.cancel.cancel();
        }
    }
}

/// A streaming client for the equities market-data feed.
pub struct EquitiesClient {
    core: ClientCore,
}

impl EquitiesClient {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            core: ClientCore::new(config),
        }
    }

    /// Establish the connection. Blocks until the first handshake
    /// succeeds or irrecoverably fails.
    pub async fn connect(&mut self) -> Result<()> {
        self.core.connect().await
    }

    /// Block until the client terminates.
    pub async fn terminated(&mut self) -> Option<StreamError> {
        self.core.terminated().await
    }

    pub async fn subscribe_trades<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_trades(symbols)).await
    }

    pub async fn subscribe_quotes<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_quotes(symbols)).await
    }

    pub async fn subscribe_bars<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_bars(symbols)).await
    }

    pub async fn subscribe_daily_bars<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_daily_bars(symbols)).await
    }

    pub async fn subscribe_statuses<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_statuses(symbols)).await
    }

    /// Clear every symbol subscribed to trades.
    pub async fn unsubscribe_from_trades(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.trades.clear()).await
    }

    /// Clear every symbol subscribed to quotes.
    pub async fn unsubscribe_from_quotes(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.quotes.clear()).await
    }

    /// Clear every symbol subscribed to minute bars.
    pub async fn unsubscribe_from_bars(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.bars.clear()).await
    }

    /// Clear every symbol subscribed to daily bars.
    pub async fn unsubscribe_from_daily_bars(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.daily_bars.clear()).await
    }

    /// Clear every symbol subscribed to trading status, equities-only.
    pub async fn unsubscribe_from_statuses(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.statuses.clear()).await
    }

    pub fn health(&self) -> ConnectionHealth {
        self.core.health()
    }

    pub fn shutdown(&self) {
        self.core.shutdown()
    }
}

/// A streaming client for the crypto market-data feed. Identical to
/// [`EquitiesClient`] except it has no trading-status channel and no feed
/// tag (§3).
pub struct CryptoClient {
    core: ClientCore,
}

impl CryptoClient {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            core: ClientCore::new(config),
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.core.connect().await
    }

    pub async fn terminated(&mut self) -> Option<StreamError> {
        self.core.terminated().await
    }

    pub async fn subscribe_trades<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_trades(symbols)).await
    }

    pub async fn subscribe_quotes<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_quotes(symbols)).await
    }

    pub async fn subscribe_bars<I, S>(&self, symbols: I) -> Result<SubscriptionSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.core.change(|set| set.add_bars(symbols)).await
    }

    /// Clear every symbol subscribed to trades.
    pub async fn unsubscribe_from_trades(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.trades.clear()).await
    }

    /// Clear every symbol subscribed to quotes.
    pub async fn unsubscribe_from_quotes(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.quotes.clear()).await
    }

    /// Clear every symbol subscribed to minute bars.
    pub async fn unsubscribe_from_bars(&self) -> Result<SubscriptionSet> {
        self.core.change(|set| set.bars.clear()).await
    }

    pub fn health(&self) -> ConnectionHealth {
        self.core.health()
    }

    pub fn shutdown(&self) {
        self.core.shutdown()
    }
}

/// Shared reconnect-delay default, exposed for callers assembling a
/// [`crate::config::EquitiesClientBuilder`] by hand instead of via
/// `Default`.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EquitiesClientBuilder;
    use crate::credentials::Credentials;

    #[test]
    fn health_before_connect_reports_created() {
        let config = EquitiesClientBuilder::default()
            .credentials(Credentials::new("k", "s"))
            .base_url(url::Url::parse("wss://127.0.0.1:1/v2").unwrap())
            .build()
            .unwrap();
        let client = EquitiesClient::new(config);
        assert_eq!(client.health().state, ClientState::Created);
    }

    #[test]
    fn shutdown_before_connect_is_a_no_op() {
        let config = EquitiesClientBuilder::default()
            .credentials(Credentials::new("k", "s"))
            .base_url(url::Url::parse("wss://127.0.0.1:1/v2").unwrap())
            .build()
            .unwrap();
        let client = EquitiesClient::new(config);
        client.shutdown();
    }
}
