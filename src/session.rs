//! A single connection's active lifetime.
//!
//! [`ConnectionSession::run`] owns one handshaken [`Transport`] exclusively
//! until the connection ends, dispatching decoded records to a pool of
//! processor tasks and serializing every subscription change and ping
//! through the same read/write loop that owns the socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::error::{map_error_code, Result, ServerErrorFrame, StreamError};
use crate::record::Record;
use crate::subscription::SubscriptionSet;
use crate::ticker::{IntervalTicker, Ticker};
use crate::transport::Transport;

/// Per-channel callbacks a session dispatches decoded records to.
#[derive(Clone, Default)]
pub struct HandlerSet {
    pub on_trade: Option<Arc<dyn Fn(crate::record::Trade) + Send + Sync>>,
    pub on_quote: Option<Arc<dyn Fn(crate::record::Quote) + Send + Sync>>,
    pub on_bar: Option<Arc<dyn Fn(crate::record::Bar) + Send + Sync>>,
    pub on_daily_bar: Option<Arc<dyn Fn(crate::record::Bar) + Send + Sync>>,
    pub on_status: Option<Arc<dyn Fn(crate::record::Status) + Send + Sync>>,
}

/// A requested change to the desired subscription set, submitted by the
/// façade. At most one may be outstanding at a time; a second request
/// while one is pending is rejected with
/// [`StreamError::SubscriptionChangeAlreadyInProgress`].
pub struct PendingChange {
    pub desired: SubscriptionSet,
    pub respond_to: oneshot::Sender<Result<SubscriptionSet>>,
}

/// Why a session ended and what it had committed at that point.
pub struct SessionOutcome {
    pub committed: SubscriptionSet,
    pub cause: Option<StreamError>,
}

/// Configuration the supervisor passes into every session it spawns.
#[derive(Clone)]
pub struct SessionParams {
    pub buffer_size: usize,
    pub processor_count: usize,
    pub ping_interval: Duration,
    /// Builds the ticker driving ping cadence. Defaults to an
    /// [`IntervalTicker`] over `ping_interval`; overridable so tests can
    /// inject a deterministic double instead of waiting on real time.
    pub ticker_factory: Arc<dyn Fn() -> Box<dyn Ticker> + Send + Sync>,
}

impl SessionParams {
    pub fn new(buffer_size: usize, processor_count: usize, ping_interval: Duration) -> Self {
        Self {
            buffer_size,
            processor_count,
            ping_interval,
            ticker_factory: Arc::new(move || {
                Box::new(IntervalTicker::new(ping_interval)) as Box<dyn Ticker>
            }),
        }
    }

    /// Override the ping ticker, e.g. with a deterministic test double.
    pub fn with_ticker_factory(
        mut self,
        factory: impl Fn() -> Box<dyn Ticker> + Send + Sync + 'static,
    ) -> Self {
        self.ticker_factory = Arc::new(factory);
        self
    }
}

pub struct ConnectionSession;

impl ConnectionSession {
    /// Drive one connection's active lifetime to completion.
    ///
    /// Returns once the transport closes, a read/write/ping fails, or
    /// `cancel` is triggered by the caller.
    pub async fn run(
        mut transport: Box<dyn Transport>,
        codec: Arc<dyn Codec>,
        handlers: Arc<HandlerSet>,
        mut committed: SubscriptionSet,
        mut change_rx: mpsc::Receiver<PendingChange>,
        cancel: CancellationToken,
        params: SessionParams,
    ) -> SessionOutcome {
        let (record_tx, record_rx) = mpsc::channel::<Record>(params.buffer_size);
        let shared_rx = Arc::new(tokio::sync::Mutex::new(record_rx));
        let mut processors = Vec::new();
        for _ in 0..params.processor_count.max(1) {
            let rx = shared_rx.clone();
            let handlers = handlers.clone();
            processors.push(tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    match next {
                        Some(record) => dispatch(&handlers, record),
                        None => break,
                    }
                }
            }));
        }

        let mut ping_ticker = (params.ticker_factory)();
        let mut pending: Option<oneshot::Sender<Result<SubscriptionSet>>> = None;

        let cause: Option<StreamError> = 'session: loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'session None,

                read_result = transport.read(&cancel) => {
                    match read_result {
                        Ok(Some(bytes)) => match codec.decode(&bytes) {
                            Ok(records) => {
                                for record in records {
                                    if let Some(cause) = handle_record(
                                        record,
                                        &mut committed,
                                        &mut pending,
                                        &record_tx,
                                    ) {
                                        break 'session Some(cause);
                                    }
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to decode frame, dropping"),
                        },
                        Ok(None) => break 'session Some(StreamError::TransportClosed),
                        Err(e) => break 'session Some(e),
                    }
                }

                _ = ping_ticker.tick() => {
                    if let Err(e) = transport.ping(&cancel).await {
                        break 'session Some(e);
                    }
                }

                maybe_change = change_rx.recv() => {
                    let Some(change) = maybe_change else { continue };
                    if let Some(cause) = handle_change(
                        change,
                        &mut transport,
                        codec.as_ref(),
                        &committed,
                        &mut pending,
                        &cancel,
                    ).await {
                        break 'session Some(cause);
                    }
                }
            }
        };

        if let Some(sender) = pending.take() {
            let _ = sender.send(Err(StreamError::SubscriptionChangeInterrupted));
        }
        drop(record_tx);
        for handle in processors {
            let _ = handle.await;
        }
        let _ = transport.close().await;

        SessionOutcome { committed, cause }
    }
}

fn dispatch(handlers: &HandlerSet, record: Record) {
    match record {
        Record::Trade(t) => {
            if let Some(f) = &handlers.on_trade {
                f(t);
            }
        }
        Record::Quote(q) => {
            if let Some(f) = &handlers.on_quote {
                f(q);
            }
        }
        Record::Bar(b) => {
            if let Some(f) = &handlers.on_bar {
                f(b);
            }
        }
        Record::DailyBar(b) => {
            if let Some(f) = &handlers.on_daily_bar {
                f(b);
            }
        }
        Record::Status(s) => {
            if let Some(f) = &handlers.on_status {
                f(s);
            }
        }
        Record::Unknown { tag } => debug!(%tag, "dropping unrecognized record"),
        Record::Success(_) | Record::ErrorFrame(_) | Record::SubscriptionAck(_) => {
            // handled inline in the read loop before reaching the processor pool
        }
    }
}

/// Handle one decoded record from the read loop. Returns `Some(cause)` if
/// the session must end.
fn handle_record(
    record: Record,
    committed: &mut SubscriptionSet,
    pending: &mut Option<oneshot::Sender<Result<SubscriptionSet>>>,
    record_tx: &mpsc::Sender<Record>,
) -> Option<StreamError> {
    match record {
        Record::SubscriptionAck(ack) => {
            let mut new_set = SubscriptionSet::new();
            new_set.add_trades(ack.trades.iter());
            new_set.add_quotes(ack.quotes.iter());
            new_set.add_bars(ack.bars.iter());
            new_set.add_daily_bars(ack.daily_bars.iter());
            new_set.add_statuses(ack.statuses.iter());
            *committed = new_set.clone();
            if let Some(sender) = pending.take() {
                let _ = sender.send(Ok(new_set));
            }
            None
        }
        Record::ErrorFrame(err) => {
            let classified = map_error_code(&ServerErrorFrame {
                code: err.code,
                message: err.msg,
            });
            if classified.is_irrecoverable() {
                return Some(classified);
            }
            // Recoverable: the desired state snaps back to whatever was
            // last committed; the session itself stays alive.
            if let Some(sender) = pending.take() {
                let _ = sender.send(Err(classified));
            }
            None
        }
        Record::Success(_) => None,
        other => {
            if record_tx.try_send(other).is_err() {
                warn!("processor queue full, dropping record");
            }
            None
        }
    }
}

/// Handle one subscription-change request from the façade. Returns
/// `Some(cause)` if a transport write failure must end the session.
async fn handle_change(
    change: PendingChange,
    transport: &mut Box<dyn Transport>,
    codec: &dyn Codec,
    committed: &SubscriptionSet,
    pending: &mut Option<oneshot::Sender<Result<SubscriptionSet>>>,
    cancel: &CancellationToken,
) -> Option<StreamError> {
    if pending.is_some() {
        let _ = change
            .respond_to
            .send(Err(StreamError::SubscriptionChangeAlreadyInProgress));
        return None;
    }

    let add = change.desired.difference(committed);
    let remove = committed.difference(&change.desired);
    if add.is_empty() && remove.is_empty() {
        let _ = change.respond_to.send(Ok(committed.clone()));
        return None;
    }

    if !add.is_empty() {
        match codec.encode_subscribe(&add) {
            Ok(frame) => {
                if let Err(e) = transport.write(frame, cancel).await {
                    return Some(e);
                }
            }
            Err(e) => {
                let _ = change.respond_to.send(Err(e));
                return None;
            }
        }
    }
    if !remove.is_empty() {
        match codec.encode_unsubscribe(&remove) {
            Ok(frame) => {
                if let Err(e) = transport.write(frame, cancel).await {
                    return Some(e);
                }
            }
            Err(e) => {
                let _ = change.respond_to.send(Err(e));
                return None;
            }
        }
    }

    *pending = Some(change.respond_to);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::transport::mock::MockTransport;

    fn ack_frame(trades: &[&str]) -> Vec<u8> {
        let symbols = trades
            .iter()
            .map(|s| rmpv::Value::String((*s).into()))
            .collect();
        let value = rmpv::Value::Array(vec![rmpv::Value::Map(vec![
            (
                rmpv::Value::String("T".into()),
                rmpv::Value::String("subscription".into()),
            ),
            (rmpv::Value::String("trades".into()), rmpv::Value::Array(symbols)),
        ])]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).unwrap();
        buf
    }

    #[tokio::test]
    async fn session_ends_when_transport_closes() {
        let (transport, handle) = MockTransport::new();
        handle.end_stream();
        let codec: Arc<dyn Codec> = Arc::new(MsgPackCodec::new());
        let handlers = Arc::new(HandlerSet::default());
        let (_change_tx, change_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let outcome = ConnectionSession::run(
            Box::new(transport),
            codec,
            handlers,
            SubscriptionSet::new(),
            change_rx,
            cancel,
            SessionParams::new(8, 1, Duration::from_secs(60)),
        )
        .await;
        assert!(matches!(outcome.cause, Some(StreamError::TransportClosed)));
    }

    /// A [`Ticker`] that fires once immediately, then never again — enough
    /// to prove a single tick drives exactly one ping without needing
    /// paused-time bookkeeping alongside the other `select!` branches.
    struct FireOnceTicker {
        fired: bool,
    }

    #[async_trait::async_trait]
    impl Ticker for FireOnceTicker {
        async fn tick(&mut self) {
            if !self.fired {
                self.fired = true;
                return;
            }
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn injected_ticker_drives_a_ping() {
        let (transport, handle) = MockTransport::new();
        let codec: Arc<dyn Codec> = Arc::new(MsgPackCodec::new());
        let handlers = Arc::new(HandlerSet::default());
        let (_change_tx, change_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let session_cancel = cancel.clone();

        let params = SessionParams::new(8, 1, Duration::from_secs(3600))
            .with_ticker_factory(|| Box::new(FireOnceTicker { fired: false }));

        let run = tokio::spawn(ConnectionSession::run(
            Box::new(transport),
            codec,
            handlers,
            SubscriptionSet::new(),
            change_rx,
            session_cancel,
            params,
        ));

        while handle.ping_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.ping_count(), 1);

        cancel.cancel();
        let _ = run.await.unwrap();
    }

    #[tokio::test]
    async fn subscription_change_updates_committed_set() {
        let (transport, handle) = MockTransport::new();
        handle.push_inbound(ack_frame(&["AAPL"]));
        let codec: Arc<dyn Codec> = Arc::new(MsgPackCodec::new());
        let handlers = Arc::new(HandlerSet::default());
        let (change_tx, change_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let session_cancel = cancel.clone();
        let run = tokio::spawn(ConnectionSession::run(
            Box::new(transport),
            codec,
            handlers,
            SubscriptionSet::new(),
            change_rx,
            session_cancel,
            SessionParams::new(8, 1, Duration::from_secs(60)),
        ));

        let mut desired = SubscriptionSet::new();
        desired.add_trades(["AAPL"]);
        let (tx, rx) = oneshot::channel();
        change_tx
            .send(PendingChange {
                desired,
                respond_to: tx,
            })
            .await
            .unwrap();
        let committed = rx.await.unwrap().unwrap();
        assert!(committed.trades.contains("AAPL"));

        cancel.cancel();
        let outcome = run.await.unwrap();
        assert!(outcome.cause.is_none());
    }
}
