//! Wire format of the market channel.
//!
//! Outbound: `{"type": "subscribe"|"unsubscribe", "channel": "market", "markets": [...]}`.
//!
//! Inbound frames are a single event object or an array of them, tagged by
//! `event_type`:
//! - `price_change`: one `(side, price[, size])` tick, or a `price_changes`
//!   list whose entries may carry `best_bid`/`best_ask` directly
//! - `book`: full `bids`/`asks` snapshot
//!
//! Other event types are ignored.

use crate::client::types::{field, string_field};
use crate::orderbook::{parse_decimal, parse_timestamp, OrderBook, WireLevel};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub const MARKET_CHANNEL: &str = "market";

/// Token id spellings, in lookup order.
const TOKEN_ID_FIELDS: &[&str] = &["asset_id", "market", "assetId"];
const EVENT_TYPE_FIELDS: &[&str] = &["event_type", "type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlMessage<'a> {
    #[serde(rename = "type")]
    pub kind: ControlType,
    pub channel: &'static str,
    pub markets: &'a [String],
}

impl<'a> ControlMessage<'a> {
    pub fn new(kind: ControlType, markets: &'a [String]) -> Self {
        Self {
            kind,
            channel: MARKET_CHANNEL,
            markets,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Incremental; absent sides are unknown, not empty.
    PriceChange,
    /// Full snapshot; absent sides are empty.
    Book,
}

/// Normalized best bid/ask tick for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketUpdate {
    pub token_id: String,
    pub kind: UpdateKind,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    /// Exchange timestamp in unix milliseconds, when the frame carries one.
    pub timestamp: Option<i64>,
    pub received_at: DateTime<Utc>,
}

impl MarketUpdate {
    fn empty(token_id: String, kind: UpdateKind, timestamp: Option<i64>, received_at: DateTime<Utc>) -> Self {
        Self {
            token_id,
            kind,
            best_bid: None,
            best_ask: None,
            bid_size: None,
            ask_size: None,
            timestamp,
            received_at,
        }
    }

    /// Book snapshot as an update; sides take the best level.
    pub fn from_book(book: &OrderBook, received_at: DateTime<Utc>) -> Self {
        let mut update = Self::empty(book.token_id.clone(), UpdateKind::Book, book.timestamp, received_at);
        if let Some(bid) = book.best_bid() {
            update.best_bid = Some(bid.price);
            update.bid_size = Some(bid.size);
        }
        if let Some(ask) = book.best_ask() {
            update.best_ask = Some(ask.price);
            update.ask_size = Some(ask.size);
        }
        update
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_bid? + self.best_ask?) / Decimal::from(2))
    }
}

/// Decode one inbound frame. Unknown events and events without a token id
/// are dropped.
pub fn decode_frame(text: &str, received_at: DateTime<Utc>) -> Result<Vec<MarketUpdate>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let events = match &value {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };

    let mut updates = Vec::new();
    for event in events {
        decode_event(event, received_at, &mut updates);
    }
    Ok(updates)
}

fn decode_event(event: &Value, received_at: DateTime<Utc>, out: &mut Vec<MarketUpdate>) {
    let event_type = field(event, EVENT_TYPE_FIELDS)
        .and_then(Value::as_str)
        .unwrap_or("");
    let token_id = string_field(event, TOKEN_ID_FIELDS);
    let timestamp = event.get("timestamp").and_then(parse_timestamp);

    match event_type {
        "price_change" => {
            if let Some(changes) = event.get("price_changes").and_then(Value::as_array) {
                for change in changes {
                    let token = string_field(change, TOKEN_ID_FIELDS).or_else(|| token_id.clone());
                    if let Some(token) = token {
                        out.push(decode_change(change, token, timestamp, received_at));
                    }
                }
            } else if let Some(token) = token_id {
                out.push(decode_change(event, token, timestamp, received_at));
            }
        }
        "book" => {
            let Some(token) = token_id else { return };
            let levels = |name: &str| -> Vec<_> {
                event
                    .get(name)
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|l| serde_json::from_value::<WireLevel>(l.clone()).ok())
                            .filter_map(|l| l.parse())
                            .collect()
                    })
                    .unwrap_or_default()
            };
            let mut book = OrderBook::from_levels(token, levels("bids"), levels("asks"));
            book.timestamp = timestamp;
            out.push(MarketUpdate::from_book(&book, received_at));
        }
        other => {
            debug!(event_type = other, "ignoring market event");
        }
    }
}

fn decode_change(
    change: &Value,
    token_id: String,
    timestamp: Option<i64>,
    received_at: DateTime<Utc>,
) -> MarketUpdate {
    let mut update = MarketUpdate::empty(token_id, UpdateKind::PriceChange, timestamp, received_at);
    let decimal = |name: &str| change.get(name).and_then(parse_decimal);

    update.best_bid = decimal("best_bid");
    update.best_ask = decimal("best_ask");
    if update.best_bid.is_some() || update.best_ask.is_some() {
        return update;
    }

    let side = change.get("side").and_then(Value::as_str).unwrap_or("");
    let price = decimal("price");
    let size = decimal("size");
    if side.eq_ignore_ascii_case("buy") {
        update.best_bid = price;
        update.bid_size = size;
    } else if side.eq_ignore_ascii_case("sell") {
        update.best_ask = price;
        update.ask_size = size;
    }
    update
}
