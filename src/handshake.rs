//! The welcome → auth → subscribe handshake.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec::Codec;
use crate::credentials::Credentials;
use crate::error::{Result, StreamError};
use crate::record::Record;
use crate::subscription::SubscriptionSet;
use crate::transport::Transport;

/// Run the handshake on a freshly connected `transport`: wait for the
/// welcome frame, authenticate, and (if `initial` is non-empty) subscribe.
///
/// Returns the subscription set the server actually committed to, which
/// may differ from `initial` if the server rejects part of it with a
/// recoverable error.
pub async fn run_handshake(
    transport: &mut dyn Transport,
    codec: &dyn Codec,
    creds: &Credentials,
    initial: &SubscriptionSet,
    cancel: &CancellationToken,
) -> Result<SubscriptionSet> {
    await_welcome(transport, codec, cancel).await?;

    let auth_frame = codec.encode_auth(creds)?;
    transport.write(auth_frame, cancel).await?;
    await_authenticated(transport, codec, cancel).await?;
    info!("authenticated");

    if initial.is_empty() {
        return Ok(SubscriptionSet::new());
    }

    let subscribe_frame = codec.encode_subscribe(initial)?;
    transport.write(subscribe_frame, cancel).await?;
    let committed = await_subscription_ack(transport, codec, cancel).await?;
    debug!(?committed, "initial subscription committed");
    Ok(committed)
}

async fn await_welcome(
    transport: &mut dyn Transport,
    codec: &dyn Codec,
    cancel: &CancellationToken,
) -> Result<()> {
    let bytes = transport
        .read(cancel)
        .await?
        .ok_or(StreamError::NoConnected)?;
    // Any payload that isn't a clean `success{msg:"connected"}` frame —
    // including one that doesn't even decode — means no welcome arrived.
    let records = codec.decode(&bytes).map_err(|_| StreamError::NoConnected)?;
    match records.first() {
        Some(Record::Success(msg)) if msg.msg == "connected" => Ok(()),
        _ => Err(StreamError::NoConnected),
    }
}

async fn await_authenticated(
    transport: &mut dyn Transport,
    codec: &dyn Codec,
    cancel: &CancellationToken,
) -> Result<()> {
    let bytes = transport
        .read(cancel)
        .await?
        .ok_or(StreamError::NoConnected)?;
    let records = codec.decode(&bytes)?;
    match records.first() {
        Some(Record::Success(msg)) if msg.msg == "authenticated" => Ok(()),
        Some(Record::ErrorFrame(err)) => Err(classify_auth_error(err.code, &err.msg)),
        other => Err(StreamError::BadAuthResponse(format!("{other:?}"))),
    }
}

fn classify_auth_error(code: i64, message: &str) -> StreamError {
    match code {
        401 | 402 | 404 => StreamError::InvalidCredentials,
        other => StreamError::ServerError {
            code: other,
            message: message.to_string(),
        },
    }
}

async fn await_subscription_ack(
    transport: &mut dyn Transport,
    codec: &dyn Codec,
    cancel: &CancellationToken,
) -> Result<SubscriptionSet> {
    let bytes = transport
        .read(cancel)
        .await?
        .ok_or(StreamError::NoConnected)?;
    let records = codec.decode(&bytes)?;
    match records.first() {
        Some(Record::SubscriptionAck(ack)) => {
            let mut set = SubscriptionSet::new();
            set.add_trades(ack.trades.iter());
            set.add_quotes(ack.quotes.iter());
            set.add_bars(ack.bars.iter());
            set.add_daily_bars(ack.daily_bars.iter());
            set.add_statuses(ack.statuses.iter());
            Ok(set)
        }
        Some(Record::ErrorFrame(err)) => {
            Err(crate::error::map_error_code(&crate::error::ServerErrorFrame {
                code: err.code,
                message: err.msg.clone(),
            }))
        }
        other => Err(StreamError::BadAuthResponse(format!("{other:?}"))),
    }
}
