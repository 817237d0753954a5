//! Self-healing market data stream.
//!
//! `MarketStream::run` drives the connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Subscribed -> (reading)
//!      ^                                                      |
//!      +------------- backoff <---- read/write error ---------+
//! ```
//!
//! Every reconnect resends the full subscription set before reading. The
//! loop only exits on [`MarketStream::close`] or the shared shutdown signal.
//!
//! The stream is best-effort. Callers should still poll `GET /book` near
//! decision time and let the newer timestamp win (see [`QuoteCache`]).

pub mod backoff;
pub mod codec;
pub mod quotes;

pub use backoff::Backoff;
pub use codec::{MarketUpdate, UpdateKind};
pub use quotes::{Quote, QuoteCache};

use crate::shutdown::Shutdown;
use codec::{ControlMessage, ControlType};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Called synchronously on the read task, in registration order. Must not
/// block: a slow observer stalls decoding for every instrument. A panic is
/// caught and logged; the stream keeps running.
pub type Observer = Arc<dyn Fn(&MarketUpdate) + Send + Sync>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("no traffic for {0:?}")]
    ReadTimeout(Duration),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("keepalive ping failed")]
    PingFailed,
    #[error("write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub ping_interval: Duration,
    /// Extra grace after `ping_interval` before a silent connection is dead.
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// Silence longer than this ends the session.
    pub fn read_deadline(&self) -> Duration {
        self.ping_interval + self.pong_timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    /// Terminal; `close` was called or shutdown was signalled.
    Closed,
}

enum SessionEnd {
    Stopped,
    Lost(StreamError),
}

/// Write half of the live connection plus the channel that ends its session.
struct Connection {
    sink: WsSink,
    lost: mpsc::Sender<StreamError>,
}

struct Inner {
    config: StreamConfig,
    subscribed: RwLock<BTreeSet<String>>,
    observers: RwLock<Vec<Observer>>,
    /// Held across every write so subscribe calls never interleave with a
    /// reconnect's resubscribe.
    conn: Mutex<Option<Connection>>,
    state: watch::Sender<StreamState>,
    closed: Shutdown,
}

impl Inner {
    fn set_state(&self, state: StreamState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "market stream state");
        }
    }

    /// Discard a connection whose write failed and wake its read loop.
    fn drop_connection(&self, slot: &mut Option<Connection>, error: &StreamError) {
        if let Some(conn) = slot.take() {
            let _ = conn.lost.try_send(StreamError::WriteFailed(error.to_string()));
            self.set_state(StreamState::Disconnected);
        }
    }
}

#[derive(Clone)]
pub struct MarketStream {
    inner: Arc<Inner>,
}

// A panicking observer must not wedge the stream; the guarded data stays
// consistent because every critical section is a single insert/remove/clone.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn send_with_timeout(sink: &mut WsSink, msg: Message, limit: Duration) -> Result<(), StreamError> {
    match timeout(limit, sink.send(msg)).await {
        Ok(res) => res.map_err(StreamError::from),
        Err(_) => Err(StreamError::WriteTimeout(limit)),
    }
}

impl MarketStream {
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        url::Url::parse(&config.url)?;
        let (state, _) = watch::channel(StreamState::Disconnected);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                subscribed: RwLock::new(BTreeSet::new()),
                observers: RwLock::new(Vec::new()),
                conn: Mutex::new(None),
                state,
                closed: Shutdown::new(),
            }),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Register an observer. Observers are never removed; one that panics is
    /// logged and skipped for that update.
    pub fn on_update<F>(&self, observer: F)
    where
        F: Fn(&MarketUpdate) + Send + Sync + 'static,
    {
        write_lock(&self.inner.observers).push(Arc::new(observer));
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<StreamState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), StreamState::Connected | StreamState::Subscribed)
    }

    /// Snapshot of the subscription set, sorted.
    pub fn subscribed(&self) -> Vec<String> {
        read_lock(&self.inner.subscribed).iter().cloned().collect()
    }

    fn set_state(&self, state: StreamState) {
        self.inner.set_state(state);
    }

    /// Add instruments. The set is updated even when disconnected; the next
    /// connection subscribes to it. When connected the subscribe frame is
    /// sent immediately. On a write error the set has already been updated,
    /// the connection is dropped at once and the error is returned; the
    /// reconnect resubscribes the full set.
    pub async fn subscribe<I, S>(&self, token_ids: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_subscriptions(ControlType::Subscribe, token_ids).await
    }

    /// Remove instruments; same delivery rules as [`subscribe`](Self::subscribe).
    pub async fn unsubscribe<I, S>(&self, token_ids: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_subscriptions(ControlType::Unsubscribe, token_ids).await
    }

    async fn update_subscriptions<I, S>(&self, kind: ControlType, token_ids: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = token_ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| !id.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let mut slot = self.inner.conn.lock().await;
        {
            let mut set = write_lock(&self.inner.subscribed);
            for id in &ids {
                match kind {
                    ControlType::Subscribe => set.insert(id.clone()),
                    ControlType::Unsubscribe => set.remove(id),
                };
            }
        }

        let Some(conn) = slot.as_mut() else {
            debug!(count = ids.len(), action = ?kind, "not connected, subscription deferred");
            return Ok(());
        };
        let frame = ControlMessage::new(kind, &ids).to_json()?;
        if let Err(e) = send_with_timeout(&mut conn.sink, Message::Text(frame), self.inner.config.write_timeout).await {
            warn!(error = %e, action = ?kind, "subscription write failed, dropping connection");
            self.inner.drop_connection(&mut slot, &e);
            return Err(e);
        }
        info!(count = ids.len(), action = ?kind, "market subscription updated");
        Ok(())
    }

    /// Stop the stream. The run loop exits instead of reconnecting.
    /// Idempotent.
    pub async fn close(&self) {
        self.inner.closed.trigger();
        let mut slot = self.inner.conn.lock().await;
        if let Some(mut conn) = slot.take() {
            let _ = timeout(self.inner.config.write_timeout, conn.sink.send(Message::Close(None))).await;
        }
        drop(slot);
        self.set_state(StreamState::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_triggered()
    }

    async fn stopped(&self, shutdown: &Shutdown) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = self.inner.closed.cancelled() => {}
        }
    }

    fn dispatch(&self, text: &str) {
        let updates = match codec::decode_frame(text, chrono::Utc::now()) {
            Ok(updates) => updates,
            Err(e) => {
                debug!(error = %e, "undecodable market frame");
                return;
            }
        };
        if updates.is_empty() {
            return;
        }
        let observers: Vec<Observer> = read_lock(&self.inner.observers).clone();
        for update in &updates {
            for observer in &observers {
                if catch_unwind(AssertUnwindSafe(|| observer(update))).is_err() {
                    warn!(token_id = %update.token_id, "market observer panicked");
                }
            }
        }
    }

    /// Run until closed or `shutdown` fires. Connection failures are logged
    /// and retried with backoff; they never end the loop.
    pub async fn run(&self, shutdown: Shutdown) {
        let config = &self.inner.config;
        let mut backoff = Backoff::new(config.initial_backoff, config.max_backoff);
        let mut failures: u32 = 0;

        loop {
            if shutdown.is_triggered() || self.is_closed() {
                break;
            }

            self.set_state(StreamState::Connecting);
            info!(url = %config.url, "connecting to market stream");

            match self.session(&shutdown).await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Lost(e)) => {
                    failures = 0;
                    backoff.reset();
                    warn!(error = %e, "market stream disconnected");
                }
                Err(e) => {
                    failures += 1;
                    if failures == 1 {
                        warn!(error = %e, "market stream connection failed, relying on REST polling");
                    } else {
                        debug!(error = %e, failures, "market stream connection failed");
                    }
                }
            }

            self.set_state(StreamState::Disconnected);
            let delay = backoff.next_delay();
            info!(delay = ?delay, "reconnecting to market stream");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.stopped(&shutdown) => break,
            }
        }

        // Shutdown without close(): release the connection ourselves.
        if let Some(mut conn) = self.inner.conn.lock().await.take() {
            let _ = timeout(config.write_timeout, conn.sink.send(Message::Close(None))).await;
        }
        self.set_state(StreamState::Closed);
        info!("market stream stopped");
    }

    /// One connection lifetime. `Err` means the connection never came up.
    async fn session(&self, shutdown: &Shutdown) -> Result<SessionEnd, StreamError> {
        let config = &self.inner.config;

        let connect = timeout(config.connect_timeout, connect_async(config.url.as_str()));
        let ws = tokio::select! {
            res = connect => match res {
                Ok(Ok((ws, _response))) => ws,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(StreamError::ConnectTimeout(config.connect_timeout)),
            },
            _ = self.stopped(shutdown) => return Ok(SessionEnd::Stopped),
        };
        let (write, mut read) = ws.split();
        let (lost_tx, mut lost_rx) = mpsc::channel::<StreamError>(2);

        {
            let mut slot = self.inner.conn.lock().await;
            if self.is_closed() {
                return Ok(SessionEnd::Stopped);
            }
            let conn = slot.insert(Connection {
                sink: write,
                lost: lost_tx.clone(),
            });
            self.set_state(StreamState::Connected);
            info!(url = %config.url, "market stream connected");

            let ids = self.subscribed();
            if !ids.is_empty() {
                let frame = ControlMessage::new(ControlType::Subscribe, &ids).to_json()?;
                if let Err(e) = send_with_timeout(&mut conn.sink, Message::Text(frame), config.write_timeout).await {
                    *slot = None;
                    return Ok(SessionEnd::Lost(e));
                }
                info!(count = ids.len(), "resubscribed to markets");
            }
            self.set_state(StreamState::Subscribed);
        }

        let keepalive = tokio::spawn(keepalive(self.inner.clone(), lost_tx));

        let deadline = config.read_deadline();
        let end = loop {
            let frame = tokio::select! {
                _ = self.stopped(shutdown) => break SessionEnd::Stopped,
                Some(e) = lost_rx.recv() => break SessionEnd::Lost(e),
                frame = timeout(deadline, read.next()) => frame,
            };
            match frame {
                Err(_) => break SessionEnd::Lost(StreamError::ReadTimeout(deadline)),
                Ok(None) => break SessionEnd::Lost(StreamError::Closed),
                Ok(Some(Err(e))) => break SessionEnd::Lost(e.into()),
                Ok(Some(Ok(Message::Text(text)))) => self.dispatch(&text),
                Ok(Some(Ok(Message::Binary(bytes)))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.dispatch(text),
                    Err(_) => debug!(len = bytes.len(), "ignoring non-utf8 binary frame"),
                },
                Ok(Some(Ok(Message::Close(frame)))) => {
                    info!(frame = ?frame, "market stream received close frame");
                    break SessionEnd::Lost(StreamError::Closed);
                }
                // Pings, pongs and raw frames only reset the deadline.
                Ok(Some(Ok(_))) => {}
            }
        };

        keepalive.abort();
        let mut slot = self.inner.conn.lock().await;
        if let Some(mut conn) = slot.take() {
            if matches!(end, SessionEnd::Stopped) {
                let _ = timeout(config.write_timeout, conn.sink.send(Message::Close(None))).await;
            }
        }
        Ok(end)
    }
}

/// Ping on a fixed interval. Reports the first failure and exits.
async fn keepalive(inner: Arc<Inner>, errors: mpsc::Sender<StreamError>) {
    let mut ticker = interval(inner.config.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let mut slot = inner.conn.lock().await;
        let Some(conn) = slot.as_mut() else {
            drop(slot);
            let _ = errors.send(StreamError::PingFailed).await;
            return;
        };
        if let Err(e) = send_with_timeout(&mut conn.sink, Message::Ping(Vec::new()), inner.config.write_timeout).await {
            warn!(error = %e, "market stream ping failed");
            *slot = None;
            drop(slot);
            let _ = errors.send(e).await;
            return;
        }
        debug!("market stream ping sent");
    }
}

impl std::fmt::Debug for MarketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStream")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("subscribed", &read_lock(&self.inner.subscribed).len())
            .finish()
    }
}
