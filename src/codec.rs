//! MessagePack frame codec.
//!
//! Outbound frames are single MessagePack maps; inbound frames are arrays
//! of maps tagged by a `T` field. Decoding goes through [`rmpv::Value`]
//! rather than per-type `serde::Deserialize` structs because a single
//! inbound frame mixes record kinds the decoder can only tell apart after
//! reading `T`.

use crate::credentials::Credentials;
use crate::error::{map_error_code, Result, ServerErrorFrame, StreamError};
use crate::record::{Bar, ErrorMessage, Quote, Record, Status, SubscriptionAck, SuccessMessage, Trade};
use crate::subscription::SubscriptionSet;

/// Encodes outbound control frames and decodes inbound data frames.
///
/// Implementations must be `Send + Sync` so a single codec instance can be
/// shared across a session's reader and writer tasks.
pub trait Codec: Send + Sync {
    /// Build the `auth` frame sent immediately after the welcome message.
    fn encode_auth(&self, creds: &Credentials) -> Result<Vec<u8>>;

    /// Build a `subscribe` frame carrying only the channels present in
    /// `delta` (an empty channel is omitted, not sent as `[]`).
    fn encode_subscribe(&self, delta: &SubscriptionSet) -> Result<Vec<u8>>;

    /// Build an `unsubscribe` frame carrying the channels being removed.
    fn encode_unsubscribe(&self, delta: &SubscriptionSet) -> Result<Vec<u8>>;

    /// Decode one inbound message, which may carry more than one record.
    fn decode(&self, data: &[u8]) -> Result<Vec<Record>>;
}

/// Default [`Codec`] implementation, backed by `rmp-serde`/`rmpv`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_action(&self, fields: Vec<(&str, rmpv::Value)>) -> Result<Vec<u8>> {
        let map = rmpv::Value::Map(
            fields
                .into_iter()
                .map(|(k, v)| (rmpv::Value::String(k.into()), v))
                .collect(),
        );
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &map).map_err(|e| StreamError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn subscribe_fields(delta: &SubscriptionSet) -> Vec<(&'static str, rmpv::Value)> {
        let mut fields = Vec::new();
        push_channel(&mut fields, "trades", &delta.trades);
        push_channel(&mut fields, "quotes", &delta.quotes);
        push_channel(&mut fields, "bars", &delta.bars);
        push_channel(&mut fields, "dailyBars", &delta.daily_bars);
        push_channel(&mut fields, "statuses", &delta.statuses);
        fields
    }
}

fn push_channel(
    fields: &mut Vec<(&'static str, rmpv::Value)>,
    name: &'static str,
    symbols: &std::collections::BTreeSet<String>,
) {
    if symbols.is_empty() {
        return;
    }
    let arr = symbols
        .iter()
        .map(|s| rmpv::Value::String(s.clone().into()))
        .collect();
    fields.push((name, rmpv::Value::Array(arr)));
}

impl Codec for MsgPackCodec {
    fn encode_auth(&self, creds: &Credentials) -> Result<Vec<u8>> {
        self.encode_action(vec![
            ("action", rmpv::Value::String("auth".into())),
            ("key", rmpv::Value::String(creds.key().to_string().into())),
            (
                "secret",
                rmpv::Value::String(creds.secret().to_string().into()),
            ),
        ])
    }

    fn encode_subscribe(&self, delta: &SubscriptionSet) -> Result<Vec<u8>> {
        let mut fields = vec![("action", rmpv::Value::String("subscribe".into()))];
        fields.extend(Self::subscribe_fields(delta));
        self.encode_action(fields)
    }

    fn encode_unsubscribe(&self, delta: &SubscriptionSet) -> Result<Vec<u8>> {
        let mut fields = vec![("action", rmpv::Value::String("unsubscribe".into()))];
        fields.extend(Self::subscribe_fields(delta));
        self.encode_action(fields)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<Record>> {
        let value = rmpv::decode::read_value(&mut std::io::Cursor::new(data))
            .map_err(|e| StreamError::Decode(e.to_string()))?;
        let entries = match value {
            rmpv::Value::Array(items) => items,
            single @ rmpv::Value::Map(_) => vec![single],
            other => {
                return Err(StreamError::Decode(format!(
                    "expected array or map at top level, got {other:?}"
                )))
            }
        };
        entries.iter().map(decode_one).collect()
    }
}

fn field<'a>(map: &'a [(rmpv::Value, rmpv::Value)], name: &str) -> Option<&'a rmpv::Value> {
    map.iter()
        .find(|(k, _)| k.as_str() == Some(name))
        .map(|(_, v)| v)
}

fn as_str(map: &[(rmpv::Value, rmpv::Value)], name: &str) -> String {
    field(map, name)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn as_f64(map: &[(rmpv::Value, rmpv::Value)], name: &str) -> f64 {
    field(map, name).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn as_i64(map: &[(rmpv::Value, rmpv::Value)], name: &str) -> i64 {
    field(map, name).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn as_str_vec(map: &[(rmpv::Value, rmpv::Value)], name: &str) -> Vec<String> {
    match field(map, name) {
        Some(rmpv::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_one(value: &rmpv::Value) -> Result<Record> {
    let map = value
        .as_map()
        .ok_or_else(|| StreamError::Decode("expected a map record".into()))?;
    let tag = field(map, "T")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StreamError::Decode("record missing T tag".into()))?;
    Ok(match tag {
        "success" => Record::Success(SuccessMessage {
            msg: as_str(map, "msg"),
        }),
        "error" => {
            let frame = ServerErrorFrame {
                code: as_i64(map, "code"),
                message: as_str(map, "msg"),
            };
            let classified = map_error_code(&frame);
            Record::ErrorFrame(ErrorMessage {
                code: frame.code,
                msg: match classified {
                    StreamError::ServerError { message, .. } => message,
                    _ => frame.message,
                },
            })
        }
        "subscription" => Record::SubscriptionAck(SubscriptionAck {
            trades: as_str_vec(map, "trades"),
            quotes: as_str_vec(map, "quotes"),
            bars: as_str_vec(map, "bars"),
            daily_bars: as_str_vec(map, "dailyBars"),
            statuses: as_str_vec(map, "statuses"),
        }),
        "t" => Record::Trade(Trade {
            symbol: as_str(map, "S"),
            price: as_f64(map, "p"),
            size: as_f64(map, "s"),
            timestamp: as_str(map, "t"),
            exchange: as_str(map, "x"),
            trade_id: as_i64(map, "i"),
            tape: as_str(map, "z"),
        }),
        "q" => Record::Quote(Quote {
            symbol: as_str(map, "S"),
            bid_price: as_f64(map, "bp"),
            bid_size: as_f64(map, "bs"),
            bid_exchange: as_str(map, "bx"),
            ask_price: as_f64(map, "ap"),
            ask_size: as_f64(map, "as"),
            ask_exchange: as_str(map, "ax"),
            timestamp: as_str(map, "t"),
            tape: as_str(map, "z"),
        }),
        "b" => Record::Bar(decode_bar(map)),
        "d" => Record::DailyBar(decode_bar(map)),
        "s" => Record::Status(Status {
            symbol: as_str(map, "S"),
            status_code: as_str(map, "sc"),
            status_message: as_str(map, "sm"),
            reason_code: as_str(map, "rc"),
            reason_message: as_str(map, "rm"),
            timestamp: as_str(map, "t"),
            tape: as_str(map, "z"),
        }),
        other => Record::Unknown {
            tag: other.to_string(),
        },
    })
}

fn decode_bar(map: &[(rmpv::Value, rmpv::Value)]) -> Bar {
    Bar {
        symbol: as_str(map, "S"),
        open: as_f64(map, "o"),
        high: as_f64(map, "h"),
        low: as_f64(map, "l"),
        close: as_f64(map, "c"),
        volume: as_f64(map, "v"),
        timestamp: as_str(map, "t"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MsgPackCodec {
        MsgPackCodec::new()
    }

    #[test]
    fn encode_auth_round_trips_through_decode_shape() {
        let creds = Credentials::new("k", "s");
        let bytes = codec().encode_auth(&creds).unwrap();
        let value = rmpv::decode::read_value(&mut std::io::Cursor::new(bytes)).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(field(map, "action").unwrap().as_str(), Some("auth"));
        assert_eq!(field(map, "key").unwrap().as_str(), Some("k"));
    }

    #[test]
    fn encode_subscribe_omits_empty_channels() {
        let mut delta = SubscriptionSet::default();
        delta.trades.insert("AAPL".into());
        let bytes = codec().encode_subscribe(&delta).unwrap();
        let value = rmpv::decode::read_value(&mut std::io::Cursor::new(bytes)).unwrap();
        let map = value.as_map().unwrap();
        assert!(field(map, "trades").is_some());
        assert!(field(map, "quotes").is_none());
    }

    #[test]
    fn decode_classifies_trade_record() {
        let frame = rmpv::Value::Array(vec![rmpv::Value::Map(vec![
            (rmpv::Value::String("T".into()), rmpv::Value::String("t".into())),
            (rmpv::Value::String("S".into()), rmpv::Value::String("AAPL".into())),
            (rmpv::Value::String("p".into()), rmpv::Value::F64(190.5)),
            (rmpv::Value::String("s".into()), rmpv::Value::F64(100.0)),
        ])]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &frame).unwrap();
        let records = codec().decode(&buf).unwrap();
        match &records[0] {
            Record::Trade(t) => {
                assert_eq!(t.symbol, "AAPL");
                assert_eq!(t.price, 190.5);
            }
            other => panic!("expected Trade, got {other:?}"),
        }
    }

    #[test]
    fn decode_unknown_tag_is_preserved_not_errored() {
        let frame = rmpv::Value::Array(vec![rmpv::Value::Map(vec![(
            rmpv::Value::String("T".into()),
            rmpv::Value::String("mystery".into()),
        )])]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &frame).unwrap();
        let records = codec().decode(&buf).unwrap();
        assert!(matches!(&records[0], Record::Unknown { tag } if tag == "mystery"));
    }

    #[test]
    fn decode_error_frame_classifies_code() {
        let frame = rmpv::Value::Array(vec![rmpv::Value::Map(vec![
            (rmpv::Value::String("T".into()), rmpv::Value::String("error".into())),
            (rmpv::Value::String("code".into()), rmpv::Value::Integer(405.into())),
            (rmpv::Value::String("msg".into()), rmpv::Value::String("symbol limit".into())),
        ])]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &frame).unwrap();
        let records = codec().decode(&buf).unwrap();
        assert!(matches!(&records[0], Record::ErrorFrame(e) if e.code == 405));
    }
}
