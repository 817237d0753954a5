//! In-memory ledger of orders this process has placed.
//!
//! An entry is added when the exchange accepts an order and leaves when a
//! reconciliation pass either no longer finds it among the exchange's open
//! orders (filled or cancelled elsewhere) or cancels it for being older than
//! the configured ceiling. Reconciliation is caller-driven; the ledger never
//! schedules work on its own.

use crate::builder::{OrderArgs, Side};
use crate::client::{ClientError, ClobClient, OrderResponse};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ORDER_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedState {
    Open,
    /// No longer reported open by the exchange.
    FilledOrCancelled,
    /// Cancelled by us for exceeding the age ceiling.
    CancelledStale,
}

impl std::fmt::Display for TrackedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackedState::Open => write!(f, "open"),
            TrackedState::FilledOrCancelled => write!(f, "filled_or_cancelled"),
            TrackedState::CancelledStale => write!(f, "cancelled_stale"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    pub order_id: String,
    pub token_id: String,
    /// Caller's grouping key for the market (slug or condition id), if any.
    pub market: Option<String>,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub placed_at: DateTime<Utc>,
    pub state: TrackedState,
}

impl TrackedOrder {
    pub fn new(
        order_id: impl Into<String>,
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            token_id: token_id.into(),
            market: None,
            side,
            price,
            size,
            placed_at,
            state: TrackedState::Open,
        }
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    /// Entry for an accepted submission. `None` if the exchange did not
    /// accept it or assigned no id.
    pub fn from_accepted(response: &OrderResponse, args: &OrderArgs) -> Option<Self> {
        if !response.success || response.order_id.is_empty() {
            return None;
        }
        Some(Self::new(
            response.order_id.clone(),
            args.token_id.clone(),
            args.side,
            args.price,
            args.size,
            Utc::now(),
        ))
    }

    pub fn exposure(&self) -> Decimal {
        self.size * self.price
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.placed_at).to_std().unwrap_or(Duration::ZERO)
    }

    fn matches_instrument(&self, key: &str) -> bool {
        self.token_id == key || self.market.as_deref() == Some(key)
    }
}

/// Outcome of one reconciliation pass. Every entry carries its final state.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Gone from the exchange's open set; removed.
    pub closed: Vec<TrackedOrder>,
    /// Still open but past the age ceiling; awaiting cancellation.
    pub stale: Vec<TrackedOrder>,
    /// Stale orders cancelled and removed.
    pub cancelled: Vec<TrackedOrder>,
    /// Stale orders whose cancel request failed; still tracked.
    pub cancel_failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
            && self.stale.is_empty()
            && self.cancelled.is_empty()
            && self.cancel_failed.is_empty()
    }
}

/// Concurrency-safe map from order id to tracked order.
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    orders: Arc<DashMap<String, TrackedOrder>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an order, returning any entry it replaced.
    pub fn add(&self, order: TrackedOrder) -> Option<TrackedOrder> {
        debug!(
            order_id = %order.order_id,
            token_id = %order.token_id,
            side = %order.side,
            price = %order.price,
            size = %order.size,
            "tracking order"
        );
        self.orders.insert(order.order_id.clone(), order)
    }

    pub fn remove(&self, order_id: &str) -> Option<TrackedOrder> {
        self.orders.remove(order_id).map(|(_, order)| order)
    }

    pub fn get(&self, order_id: &str) -> Option<TrackedOrder> {
        self.orders.get(order_id).map(|o| o.clone())
    }

    /// Snapshot of every entry, oldest first.
    pub fn all(&self) -> Vec<TrackedOrder> {
        let mut orders: Vec<TrackedOrder> = self.orders.iter().map(|o| o.value().clone()).collect();
        orders.sort_by(|a, b| a.placed_at.cmp(&b.placed_at).then_with(|| a.order_id.cmp(&b.order_id)));
        orders
    }

    pub fn count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Σ size × price over open entries.
    pub fn total_exposure(&self) -> Decimal {
        self.orders
            .iter()
            .filter(|o| o.state == TrackedState::Open)
            .map(|o| o.exposure())
            .sum()
    }

    /// Whether any entry trades `key`, matched against token id or market.
    pub fn has_instrument(&self, key: &str) -> bool {
        self.orders.iter().any(|o| o.matches_instrument(key))
    }

    pub fn orders_for_instrument(&self, key: &str) -> Vec<TrackedOrder> {
        self.all()
            .into_iter()
            .filter(|o| o.matches_instrument(key))
            .collect()
    }

    /// Drop entries missing from `open_ids` and report entries older than
    /// `max_age`. `as_of` is when the open set was requested: entries placed
    /// at or after it may be missing from the set and are left alone. Stale
    /// entries stay tracked until
    /// [`mark_cancelled_stale`](Self::mark_cancelled_stale).
    pub fn reconcile(
        &self,
        open_ids: &HashSet<String>,
        as_of: DateTime<Utc>,
        max_age: Duration,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for order in self.all() {
            if order.placed_at >= as_of {
                debug!(order_id = %order.order_id, "order newer than open-order snapshot, skipping");
                continue;
            }
            if !open_ids.contains(&order.order_id) {
                // removal can race a concurrent remove; only report what we took
                if let Some(mut closed) = self.remove(&order.order_id) {
                    closed.state = TrackedState::FilledOrCancelled;
                    info!(
                        order_id = %closed.order_id,
                        token_id = %closed.token_id,
                        "order no longer open"
                    );
                    report.closed.push(closed);
                }
            } else if order.age(as_of) > max_age {
                report.stale.push(order);
            }
        }
        report
    }

    /// Remove a stale entry after its cancel went through.
    pub fn mark_cancelled_stale(&self, order_id: &str) -> Option<TrackedOrder> {
        let mut order = self.remove(order_id)?;
        order.state = TrackedState::CancelledStale;
        Some(order)
    }

    /// One full pass against the exchange: fetch open orders, drop closed
    /// entries, cancel stale ones. A failed cancel keeps the entry for the
    /// next pass.
    pub async fn reconcile_with_exchange(
        &self,
        client: &ClobClient,
        max_age: Duration,
    ) -> Result<ReconcileReport, ClientError> {
        let as_of = Utc::now();
        let open_ids: HashSet<String> = client
            .open_orders()
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();

        let mut report = self.reconcile(&open_ids, as_of, max_age);
        for order in std::mem::take(&mut report.stale) {
            info!(
                order_id = %order.order_id,
                age_secs = order.age(as_of).as_secs(),
                "cancelling stale order"
            );
            match client.cancel_order(&order.order_id).await {
                Ok(()) => {
                    if let Some(cancelled) = self.mark_cancelled_stale(&order.order_id) {
                        report.cancelled.push(cancelled);
                    }
                }
                Err(e) => {
                    warn!(order_id = %order.order_id, error = %e, "failed to cancel stale order");
                    report.cancel_failed.push(order.order_id);
                }
            }
        }

        if !report.is_empty() {
            info!(
                closed = report.closed.len(),
                cancelled = report.cancelled.len(),
                cancel_failed = report.cancel_failed.len(),
                tracked = self.count(),
                exposure = %self.total_exposure(),
                "ledger reconciled"
            );
        }
        Ok(report)
    }
}
