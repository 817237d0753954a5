use super::codec::{MarketUpdate, UpdateKind};
use crate::orderbook::OrderBook;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Last known top of book for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quote {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    /// Exchange timestamp (ms) of the newest update applied.
    pub exchange_ts: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_bid? + self.best_ask?) / Decimal::from(2))
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask? - self.best_bid?)
    }
}

/// Thread-safe top-of-book cache fed by the stream and by REST polls.
///
/// Partial ticks only overwrite the side they carry. Snapshots replace both
/// sides. An update stamped older than what is already stored is dropped, so
/// whichever path delivers last does not win by arrival order alone.
#[derive(Debug, Clone, Default)]
pub struct QuoteCache {
    quotes: Arc<DashMap<String, Quote>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the update was stale and ignored.
    pub fn apply(&self, update: &MarketUpdate) -> bool {
        let mut quote = self.quotes.entry(update.token_id.clone()).or_default();
        if let (Some(have), Some(incoming)) = (quote.exchange_ts, update.timestamp) {
            if incoming < have {
                return false;
            }
        }

        match update.kind {
            UpdateKind::Book => {
                quote.best_bid = update.best_bid;
                quote.bid_size = update.bid_size;
                quote.best_ask = update.best_ask;
                quote.ask_size = update.ask_size;
            }
            UpdateKind::PriceChange => {
                if update.best_bid.is_some() {
                    quote.best_bid = update.best_bid;
                    quote.bid_size = update.bid_size;
                }
                if update.best_ask.is_some() {
                    quote.best_ask = update.best_ask;
                    quote.ask_size = update.ask_size;
                }
            }
        }
        if update.timestamp.is_some() {
            quote.exchange_ts = update.timestamp;
        }
        quote.updated_at = Some(update.received_at);
        true
    }

    /// Overwrite with a REST book snapshot.
    pub fn apply_book(&self, book: &OrderBook) -> bool {
        self.apply(&MarketUpdate::from_book(book, Utc::now()))
    }

    pub fn get(&self, token_id: &str) -> Option<Quote> {
        self.quotes.get(token_id).map(|q| q.clone())
    }

    pub fn remove(&self, token_id: &str) -> Option<Quote> {
        self.quotes.remove(token_id).map(|(_, q)| q)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Observer that feeds this cache; register it with
    /// `MarketStream::on_update`.
    pub fn observer(&self) -> impl Fn(&MarketUpdate) + Send + Sync + 'static {
        let cache = self.clone();
        move |update| {
            cache.apply(update);
        }
    }
}
