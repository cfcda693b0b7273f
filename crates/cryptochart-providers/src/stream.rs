//! Live kline subscription over the Binance WebSocket stream.
//!
//! A background tokio task owns the connection, forwards closed candles over
//! an mpsc channel and reconnects with exponential backoff until the retry
//! ceiling is reached. After that the channel simply closes.

use std::time::Duration;

use cryptochart_core::candle::Candle;
use cryptochart_core::normalize::lenient_f64;
use cryptochart_core::timeframe::Timeframe;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

pub const BINANCE_WS_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection and reconnect settings for a kline subscription.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub base_url: String,
    /// Reconnects allowed before giving up. The count only resets once a
    /// connection has delivered at least one closed candle.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_WS_BASE_URL.to_string(),
            max_retries: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
        }
    }
}

impl StreamConfig {
    /// Delay before reconnect attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn stream_url(&self, symbol: &str, timeframe: Timeframe) -> String {
        format!(
            "{}/{}@kline_{}",
            self.base_url.trim_end_matches('/'),
            symbol.to_lowercase(),
            timeframe.interval()
        )
    }
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Decode a stream message into a candle, but only if the bar is closed.
/// Anything else (in-progress bars, other events, bad JSON) yields `None`.
pub fn decode_closed_candle(text: &str) -> Option<Candle> {
    let event: KlineEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!("ignoring non-kline message: {e}");
            return None;
        }
    };
    let k = event.kline;
    if !k.is_closed {
        return None;
    }
    Some(Candle {
        time: k.open_time / 1000,
        open: lenient_f64(&k.open),
        high: lenient_f64(&k.high),
        low: lenient_f64(&k.low),
        close: lenient_f64(&k.close),
        volume: lenient_f64(&k.volume),
    })
}

/// Why the background task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    Cancelled,
    RetriesExhausted { attempts: u32 },
}

/// Handle to a running kline subscription.
///
/// Dropping the handle aborts the background task, including any pending
/// reconnect timer.
pub struct KlineSubscription {
    candles: mpsc::Receiver<Candle>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<StreamExit>>,
}

impl KlineSubscription {
    /// Next closed candle, or `None` once the subscription has stopped.
    pub async fn next_closed(&mut self) -> Option<Candle> {
        self.candles.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Close the connection and wait for the task to stop.
    pub async fn unsubscribe(mut self) -> Option<StreamExit> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for KlineSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Subscribe to closed candles for `symbol` / `timeframe`.
///
/// Must be called from within a tokio runtime.
pub fn subscribe_candle_closes(
    config: StreamConfig,
    symbol: &str,
    timeframe: Timeframe,
) -> KlineSubscription {
    let url = config.stream_url(symbol, timeframe);
    let (candle_tx, candle_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run_stream(url, config, candle_tx, shutdown_rx));

    KlineSubscription {
        candles: candle_rx,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

enum Disconnect {
    Cancelled,
    Lost { reason: String, delivered: usize },
}

async fn run_stream(
    url: String,
    config: StreamConfig,
    candle_tx: mpsc::Sender<Candle>,
    mut shutdown: oneshot::Receiver<()>,
) -> StreamExit {
    let mut failures: u32 = 0;

    loop {
        let connected = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = &mut shutdown => return StreamExit::Cancelled,
        };

        match connected {
            Ok((ws, _)) => {
                info!("kline stream connected: {url}");
                match pump(ws, &candle_tx, &mut shutdown).await {
                    Disconnect::Cancelled => return StreamExit::Cancelled,
                    Disconnect::Lost { reason, delivered } => {
                        warn!("kline stream lost after {delivered} candle(s): {reason}");
                        // Only a connection that carried data earns a fresh retry budget.
                        if delivered > 0 {
                            failures = 0;
                        }
                    }
                }
            }
            Err(e) => warn!("kline stream connect failed: {e}"),
        }

        if failures >= config.max_retries {
            warn!("kline stream giving up after {failures} reconnect attempt(s): {url}");
            return StreamExit::RetriesExhausted { attempts: failures };
        }

        let delay = config.delay_for_attempt(failures);
        failures += 1;
        debug!("kline stream reconnect {failures} in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => return StreamExit::Cancelled,
        }
    }
}

async fn pump(
    mut ws: WsStream,
    candle_tx: &mpsc::Sender<Candle>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Disconnect {
    let mut delivered = 0;
    loop {
        let reason = tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(candle) = decode_closed_candle(&text) {
                        if candle_tx.send(candle).await.is_err() {
                            let _ = ws.close(None).await;
                            return Disconnect::Cancelled;
                        }
                        delivered += 1;
                    }
                    continue;
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws.send(Message::Pong(data)).await;
                    continue;
                }
                Some(Ok(Message::Close(frame))) => format!("closed by server: {frame:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => e.to_string(),
                None => "stream ended".to_string(),
            },
            _ = &mut *shutdown => {
                let _ = ws.close(None).await;
                return Disconnect::Cancelled;
            }
        };
        return Disconnect::Lost { reason, delivered };
    }
}
