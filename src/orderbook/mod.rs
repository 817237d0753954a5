//! Order book snapshots shared by the REST client and the market stream.
//!
//! A book is replaced wholesale on every query or snapshot event and never
//! patched in place. Levels are kept best-first: bids descending, asks
//! ascending.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// A single price level in the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Snapshot of both sides of one instrument's book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Exchange timestamp, unix milliseconds, when supplied.
    pub timestamp: Option<i64>,
}

impl OrderBook {
    /// Build a book from unordered levels. Empty levels are dropped.
    pub fn from_levels(
        token_id: impl Into<String>,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
    ) -> Self {
        let mut bids: Vec<PriceLevel> = bids.into_iter().filter(|l| l.size > Decimal::ZERO).collect();
        let mut asks: Vec<PriceLevel> = asks.into_iter().filter(|l| l.size > Decimal::ZERO).collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            token_id: token_id.into(),
            bids,
            asks,
            timestamp: None,
        }
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::from(2))
    }

    /// Total notional across the top `n_levels` of each side.
    pub fn depth(&self, n_levels: usize) -> Decimal {
        let side = |levels: &[PriceLevel]| -> Decimal {
            levels.iter().take(n_levels).map(PriceLevel::notional).sum()
        };
        side(&self.bids) + side(&self.asks)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// --- Wire format ---

/// A price level as the exchange sends it.
///
/// Compatibility shim: the stream sends `[price, size]` pairs while REST
/// sends `{price, size}` objects. Either may carry strings or numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireLevel {
    Pair(Vec<Value>),
    Object { price: Value, size: Value },
}

impl WireLevel {
    pub fn parse(&self) -> Option<PriceLevel> {
        let (price, size) = match self {
            WireLevel::Pair(values) if values.len() >= 2 => (&values[0], &values[1]),
            WireLevel::Pair(_) => return None,
            WireLevel::Object { price, size } => (price, size),
        };
        Some(PriceLevel {
            price: parse_decimal(price)?,
            size: parse_decimal(size)?,
        })
    }
}

pub(crate) fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// `GET /book` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct WireBook {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<WireLevel>,
    #[serde(default)]
    pub asks: Vec<WireLevel>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl WireBook {
    /// Convert to a best-first book. Unparseable levels are skipped.
    pub fn into_book(self, requested_token: &str) -> OrderBook {
        let parse_side = |levels: &[WireLevel]| -> Vec<PriceLevel> {
            levels.iter().filter_map(WireLevel::parse).collect()
        };
        let bids = parse_side(&self.bids);
        let asks = parse_side(&self.asks);
        let skipped = self.bids.len() + self.asks.len() - bids.len() - asks.len();
        if skipped > 0 {
            debug!(token_id = %requested_token, skipped, "skipped unparseable book levels");
        }

        let token_id = self
            .asset_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| requested_token.to_string());
        let mut book = OrderBook::from_levels(token_id, bids, asks);
        book.timestamp = self.timestamp.as_ref().and_then(parse_timestamp);
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_levels_sorted_best_first() {
        let book = OrderBook::from_levels(
            "t",
            vec![
                PriceLevel::new(dec("0.40"), dec("5")),
                PriceLevel::new(dec("0.45"), dec("1")),
                PriceLevel::new(dec("0.44"), dec("0")),
            ],
            vec![
                PriceLevel::new(dec("0.60"), dec("2")),
                PriceLevel::new(dec("0.55"), dec("3")),
            ],
        );
        assert_eq!(book.best_bid().unwrap().price, dec("0.45"));
        assert_eq!(book.best_ask().unwrap().price, dec("0.55"));
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.spread(), Some(dec("0.10")));
        assert_eq!(book.mid_price(), Some(dec("0.50")));
        // 0.45*1 + 0.55*3
        assert_eq!(book.depth(1), dec("2.10"));
    }

    #[test]
    fn test_wire_level_shapes() {
        let pair: WireLevel = serde_json::from_str(r#"["0.52", "100"]"#).unwrap();
        let object: WireLevel = serde_json::from_str(r#"{"price": "0.52", "size": 100}"#).unwrap();
        let expected = PriceLevel::new(dec("0.52"), dec("100"));
        assert_eq!(pair.parse(), Some(expected));
        assert_eq!(object.parse(), Some(expected));

        let short: WireLevel = serde_json::from_str(r#"["0.52"]"#).unwrap();
        assert_eq!(short.parse(), None);
        let junk: WireLevel = serde_json::from_str(r#"{"price": "abc", "size": "1"}"#).unwrap();
        assert_eq!(junk.parse(), None);
    }

    #[test]
    fn test_wire_book() {
        let body = r#"{
            "market": "0xcondition",
            "asset_id": "123",
            "timestamp": "1700000000123",
            "bids": [{"price": "0.01", "size": "10"}, {"price": "0.48", "size": "20"}],
            "asks": [{"price": "0.99", "size": "10"}, {"price": "0.52", "size": "7"}]
        }"#;
        let book = serde_json::from_str::<WireBook>(body).unwrap().into_book("123");
        assert_eq!(book.token_id, "123");
        assert_eq!(book.timestamp, Some(1_700_000_000_123));
        assert_eq!(book.best_bid(), Some(&PriceLevel::new(dec("0.48"), dec("20"))));
        assert_eq!(book.best_ask(), Some(&PriceLevel::new(dec("0.52"), dec("7"))));

        let empty = serde_json::from_str::<WireBook>("{}").unwrap().into_book("456");
        assert_eq!(empty.token_id, "456");
        assert!(empty.is_empty());
        assert_eq!(empty.spread(), None);
    }
}
