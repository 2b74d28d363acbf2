//! The reconnect loop and client-visible state machine.
//!
//! [`Supervisor::connect`] performs the first handshake synchronously —
//! matching the "`Connect` blocks until the stream is ready or has
//! irrecoverably failed" contract — then hands back a handle and drives
//! every subsequent reconnect attempt in the background, carrying the
//! last server-committed subscription set forward into each new
//! handshake.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::Codec;
use crate::credentials::Credentials;
use crate::error::{Result, StreamError};
use crate::handshake::run_handshake;
use crate::session::{ConnectionSession, HandlerSet, PendingChange, SessionParams};
use crate::subscription::SubscriptionSet;
use crate::ticker::Backoff;
use crate::transport::TransportFactory;

/// Lifecycle state of a client, observable via [`SupervisorHandle::state_rx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Created,
    Connecting,
    Running,
    Reconnecting,
    Terminated,
}

/// Fixed parameters for the reconnect policy.
pub struct ReconnectPolicy {
    pub delay: Arc<dyn Backoff>,
    /// `0` means unlimited consecutive failures before giving up.
    pub limit: u32,
}

/// Routes façade-issued subscription changes to whichever session is
/// currently active, and tracks the authoritative desired set across
/// reconnects.
#[derive(Clone)]
pub struct ChangeRouter {
    desired: Arc<Mutex<SubscriptionSet>>,
    current: Arc<Mutex<Option<mpsc::Sender<PendingChange>>>>,
    state_rx: watch::Receiver<ClientState>,
}

impl ChangeRouter {
    /// Apply `mutate` to the desired set and forward the result to the
    /// active session, if any. Returns the server-committed set if a
    /// session was reached, or the (not yet committed) desired set if the
    /// client is between sessions.
    pub async fn submit(
        &self,
        mutate: impl FnOnce(&mut SubscriptionSet),
    ) -> Result<SubscriptionSet> {
        match *self.state_rx.borrow() {
            ClientState::Created | ClientState::Connecting => {
                return Err(StreamError::SubscriptionChangeBeforeConnect)
            }
            ClientState::Terminated => return Err(StreamError::SubscriptionChangeAfterTerminated),
            ClientState::Running | ClientState::Reconnecting => {}
        }

        let desired = {
            let mut guard = self.desired.lock().await;
            mutate(&mut guard);
            guard.clone()
        };

        let sender = self.current.lock().await.clone();
        let Some(sender) = sender else {
            return Ok(desired);
        };

        let (tx, rx) = oneshot::channel();
        if sender
            .send(PendingChange {
                desired,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Ok(self.desired.lock().await.clone());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Ok(self.desired.lock().await.clone()),
        }
    }
}

/// What the façade holds after a successful [`Supervisor::connect`].
pub struct SupervisorHandle {
    pub state_rx: watch::Receiver<ClientState>,
    pub router: ChangeRouter,
    pub terminated_rx: oneshot::Receiver<Option<StreamError>>,
    pub cancel: CancellationToken,
}

pub struct Supervisor;

impl Supervisor {
    /// Connect, performing the first handshake synchronously, then spawn
    /// the background reconnect loop.
    #[allow(clippy::too_many_arguments)]
    pub async fn connect(
        transport_factory: TransportFactory,
        codec: Arc<dyn Codec>,
        creds: Credentials,
        handlers: Arc<HandlerSet>,
        initial: SubscriptionSet,
        policy: ReconnectPolicy,
        session_params: SessionParams,
        cancel: CancellationToken,
    ) -> Result<SupervisorHandle> {
        let (state_tx, state_rx) = watch::channel(ClientState::Created);
        let _ = state_tx.send(ClientState::Connecting);

        let mut failures: u32 = 0;
        let mut committed = initial;
        let first_session_transport = loop {
            if cancel.is_cancelled() {
                let _ = state_tx.send(ClientState::Terminated);
                return Err(StreamError::Cancelled);
            }
            let transport = (transport_factory)().await;
            let mut transport = match transport {
                Ok(t) => t,
                Err(e) => match Self::record_failure(&mut failures, &policy, e).await? {
                    Some(()) => continue,
                    None => unreachable!(),
                },
            };
            match run_handshake(transport.as_mut(), codec.as_ref(), &creds, &committed, &cancel)
                .await
            {
                Ok(new_committed) => {
                    committed = new_committed;
                    break transport;
                }
                Err(e) => {
                    if e.is_irrecoverable() {
                        let _ = state_tx.send(ClientState::Terminated);
                        return Err(e);
                    }
                    Self::record_failure(&mut failures, &policy, e).await?;
                }
            }
        };

        info!("initial connection established");
        let _ = state_tx.send(ClientState::Running);

        let desired = Arc::new(Mutex::new(committed.clone()));
        let current = Arc::new(Mutex::new(None));
        let (terminal_tx, terminal_rx) = oneshot::channel();

        let router = ChangeRouter {
            desired: desired.clone(),
            current: current.clone(),
            state_rx: state_rx.clone(),
        };

        let loop_cancel = cancel.clone();
        tokio::spawn(Self::drive(
            first_session_transport,
            transport_factory,
            codec,
            creds,
            handlers,
            committed,
            desired,
            current,
            policy,
            session_params,
            state_tx,
            terminal_tx,
            loop_cancel,
        ));

        Ok(SupervisorHandle {
            state_rx,
            router,
            terminated_rx: terminal_rx,
            cancel,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        mut transport: Box<dyn crate::transport::Transport>,
        transport_factory: TransportFactory,
        codec: Arc<dyn Codec>,
        creds: Credentials,
        handlers: Arc<HandlerSet>,
        mut committed: SubscriptionSet,
        desired: Arc<Mutex<SubscriptionSet>>,
        current: Arc<Mutex<Option<mpsc::Sender<PendingChange>>>>,
        policy: ReconnectPolicy,
        session_params: SessionParams,
        state_tx: watch::Sender<ClientState>,
        terminal_tx: oneshot::Sender<Option<StreamError>>,
        cancel: CancellationToken,
    ) {
        let mut failures: u32 = 0;
        loop {
            let (change_tx, change_rx) = mpsc::channel(1);
            *current.lock().await = Some(change_tx);

            let outcome = ConnectionSession::run(
                transport,
                codec.clone(),
                handlers.clone(),
                committed.clone(),
                change_rx,
                cancel.clone(),
                session_params.clone(),
            )
            .await;

            *current.lock().await = None;
            committed = outcome.committed;

            match outcome.cause {
                None => {
                    info!("session ended by caller cancellation");
                    let _ = state_tx.send(ClientState::Terminated);
                    let _ = terminal_tx.send(None);
                    return;
                }
                Some(e) if e.is_irrecoverable() => {
                    error!(error = %e, "session ended irrecoverably");
                    let _ = state_tx.send(ClientState::Terminated);
                    let _ = terminal_tx.send(Some(e));
                    return;
                }
                Some(e) => {
                    warn!(error = %e, "session ended, reconnecting");
                    failures += 1;
                    let _ = state_tx.send(ClientState::Reconnecting);
                    if policy.limit != 0 && failures >= policy.limit {
                        let _ = state_tx.send(ClientState::Terminated);
                        let _ = terminal_tx.send(Some(StreamError::RetriesExhausted {
                            attempts: failures,
                            source: Box::new(e),
                        }));
                        return;
                    }
                    policy.delay.wait(failures).await;
                }
            }

            // Reconnect: carry `committed` forward into the next handshake,
            // but prefer whatever the caller has asked for meanwhile.
            let next_desired = desired.lock().await.clone();
            loop {
                if cancel.is_cancelled() {
                    let _ = state_tx.send(ClientState::Terminated);
                    let _ = terminal_tx.send(None);
                    return;
                }
                let candidate = match (transport_factory)().await {
                    Ok(t) => t,
                    Err(_) => {
                        failures += 1;
                        if policy.limit != 0 && failures >= policy.limit {
                            let _ = state_tx.send(ClientState::Terminated);
                            let _ = terminal_tx.send(Some(StreamError::RetriesExhausted {
                                attempts: failures,
                                source: Box::new(StreamError::Cancelled),
                            }));
                            return;
                        }
                        policy.delay.wait(failures).await;
                        continue;
                    }
                };
                let mut candidate = candidate;
                match run_handshake(
                    candidate.as_mut(),
                    codec.as_ref(),
                    &creds,
                    &next_desired,
                    &cancel,
                )
                .await
                {
                    Ok(new_committed) => {
                        committed = new_committed;
                        failures = 0;
                        let _ = state_tx.send(ClientState::Running);
                        transport = candidate;
                        break;
                    }
                    Err(e) if e.is_irrecoverable() => {
                        let _ = state_tx.send(ClientState::Terminated);
                        let _ = terminal_tx.send(Some(e));
                        return;
                    }
                    Err(e) => {
                        failures += 1;
                        if policy.limit != 0 && failures >= policy.limit {
                            let _ = state_tx.send(ClientState::Terminated);
                            let _ = terminal_tx.send(Some(StreamError::RetriesExhausted {
                                attempts: failures,
                                source: Box::new(e),
                            }));
                            return;
                        }
                        policy.delay.wait(failures).await;
                    }
                }
            }
        }
    }

    /// Bump the failure counter, enforcing `policy.limit`. Returns
    /// `Ok(Some(()))` to retry, or `Err` if the budget is exhausted.
    async fn record_failure(
        failures: &mut u32,
        policy: &ReconnectPolicy,
        cause: StreamError,
    ) -> Result<Option<()>> {
        *failures += 1;
        if policy.limit != 0 && *failures >= policy.limit {
            return Err(StreamError::RetriesExhausted {
                attempts: *failures,
                source: Box::new(cause),
            });
        }
        policy.delay.wait(*failures).await;
        Ok(Some(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::ticker::LinearBackoff;
    use crate::transport::mock::MockTransport;

    fn success_frame(msg: &str) -> Vec<u8> {
        let value = rmpv::Value::Array(vec![rmpv::Value::Map(vec![
            (rmpv::Value::String("T".into()), rmpv::Value::String("success".into())),
            (rmpv::Value::String("msg".into()), rmpv::Value::String(msg.into())),
        ])]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).unwrap();
        buf
    }

    #[tokio::test]
    async fn connect_fails_fast_on_invalid_credentials() {
        let err_value = rmpv::Value::Array(vec![rmpv::Value::Map(vec![
            (rmpv::Value::String("T".into()), rmpv::Value::String("error".into())),
            (rmpv::Value::String("code".into()), rmpv::Value::Integer(401.into())),
            (rmpv::Value::String("msg".into()), rmpv::Value::String("bad".into())),
        ])]);
        let mut err_buf = Vec::new();
        rmpv::encode::write_value(&mut err_buf, &err_value).unwrap();

        let factory: TransportFactory = Arc::new(move || {
            let welcome = success_frame("connected");
            let err_buf = err_buf.clone();
            Box::pin(async move {
                let (transport, handle) = MockTransport::new();
                handle.push_inbound(welcome);
                handle.push_inbound(err_buf);
                Ok(Box::new(transport) as Box<dyn crate::transport::Transport>)
            })
        });

        let result = Supervisor::connect(
            factory,
            Arc::new(MsgPackCodec::new()),
            Credentials::new("bad", "creds"),
            Arc::new(HandlerSet::default()),
            SubscriptionSet::new(),
            ReconnectPolicy {
                delay: Arc::new(LinearBackoff::new(Duration::from_millis(1))),
                limit: 0,
            },
            SessionParams::new(8, 1, Duration::from_secs(60)),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(StreamError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn connect_succeeds_and_reports_running() {
        let factory: TransportFactory = Arc::new(move || {
            Box::pin(async move {
                let (transport, handle) = MockTransport::new();
                handle.push_inbound(success_frame("connected"));
                handle.push_inbound(success_frame("authenticated"));
                Ok(Box::new(transport) as Box<dyn crate::transport::Transport>)
            })
        });

        let handle = Supervisor::connect(
            factory,
            Arc::new(MsgPackCodec::new()),
            Credentials::new("k", "s"),
            Arc::new(HandlerSet::default()),
            SubscriptionSet::new(),
            ReconnectPolicy {
                delay: Arc::new(LinearBackoff::new(Duration::from_millis(1))),
                limit: 0,
            },
            SessionParams::new(8, 1, Duration::from_secs(60)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*handle.state_rx.borrow(), ClientState::Running);
    }

    fn subscription_ack_frame(trades: &[&str]) -> Vec<u8> {
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

    fn decoded_action(frame: &[u8]) -> Option<String> {
        let value = rmpv::decode::read_value(&mut std::io::Cursor::new(frame)).ok()?;
        let map = value.as_map()?;
        map.iter()
            .find(|(k, _)| k.as_str() == Some("action"))
            .and_then(|(_, v)| v.as_str().map(str::to_string))
    }

    /// §8 scenario 5: the first socket closes cleanly, the supervisor opens
    /// a new one, and the carried-forward subscription set is replayed as
    /// `auth` then `subscribe` on the new socket.
    #[tokio::test]
    async fn reconnect_replays_carried_forward_subscription() {
        let attempt = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let second_handle: Arc<Mutex<Option<crate::transport::mock::MockHandle>>> =
            Arc::new(Mutex::new(None));
        let second_handle_for_factory = second_handle.clone();

        let factory: TransportFactory = Arc::new(move || {
            let attempt = attempt.clone();
            let second_handle = second_handle_for_factory.clone();
            Box::pin(async move {
                let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let (transport, handle) = MockTransport::new();
                handle.push_inbound(success_frame("connected"));
                handle.push_inbound(success_frame("authenticated"));
                if n == 0 {
                    handle.push_inbound(subscription_ack_frame(&["AL", "PACA"]));
                    handle.end_stream();
                } else {
                    handle.push_inbound(subscription_ack_frame(&["AL", "PACA"]));
                    *second_handle.lock().await = Some(handle);
                }
                Ok(Box::new(transport) as Box<dyn crate::transport::Transport>)
            })
        });

        let mut initial = SubscriptionSet::new();
        initial.add_trades(["AL", "PACA"]);

        let handle = Supervisor::connect(
            factory,
            Arc::new(MsgPackCodec::new()),
            Credentials::new("k", "s"),
            Arc::new(HandlerSet::default()),
            initial,
            ReconnectPolicy {
                delay: Arc::new(LinearBackoff::new(Duration::from_millis(1))),
                limit: 0,
            },
            SessionParams::new(8, 1, Duration::from_secs(60)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut state_rx = handle.state_rx.clone();
        loop {
            state_rx.changed().await.unwrap();
            if *state_rx.borrow() == ClientState::Running {
                let seen = second_handle.lock().await.clone();
                if seen.is_some() {
                    break;
                }
            }
        }

        let second = second_handle.lock().await.clone().unwrap();
        // Give the second handshake a moment to finish writing its frames.
        for _ in 0..100 {
            if second.outbound().len() >= 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let outbound = second.outbound();
        assert_eq!(outbound.len(), 2);
        assert_eq!(decoded_action(&outbound[0]), Some("auth".to_string()));
        assert_eq!(decoded_action(&outbound[1]), Some("subscribe".to_string()));
    }
}
