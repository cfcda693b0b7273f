//! Periodic watchlist price polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::provider::ExchangeProvider;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shorter intervals, including zero, are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Prices(HashMap<String, f64>),
    Failed(String),
}

/// Handle to a running poller. Dropping it stops polling.
pub struct PollHandle {
    events: mpsc::Receiver<PollEvent>,
    task: Option<JoinHandle<()>>,
    retry: Arc<Notify>,
}

impl PollHandle {
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    /// Poll immediately instead of waiting for the next tick.
    pub fn retry_now(&self) {
        self.retry.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop polling and wait for the task to wind down. No request is issued
    /// after this returns.
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start polling ticker prices for `symbols` every `interval`, beginning
/// immediately. Returns `None` when there is nothing to poll. Intervals below
/// [`MIN_POLL_INTERVAL`] are clamped.
///
/// Must be called from within a tokio runtime.
pub fn spawn_price_poller(
    provider: Arc<dyn ExchangeProvider>,
    symbols: Vec<String>,
    interval: Duration,
) -> Option<PollHandle> {
    if symbols.is_empty() {
        return None;
    }

    let interval = interval.max(MIN_POLL_INTERVAL);
    let (tx, rx) = mpsc::channel(16);
    let retry = Arc::new(Notify::new());
    let task = tokio::spawn(run_poller(provider, symbols, interval, tx, retry.clone()));

    Some(PollHandle {
        events: rx,
        task: Some(task),
        retry,
    })
}

async fn run_poller(
    provider: Arc<dyn ExchangeProvider>,
    symbols: Vec<String>,
    interval: Duration,
    tx: mpsc::Sender<PollEvent>,
    retry: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = retry.notified() => {
                debug!("manual price poll requested");
                ticker.reset();
            }
        }

        let event = match provider.fetch_ticker_prices(&symbols).await {
            Ok(prices) => {
                debug!("{}: fetched {} of {} prices", provider.name(), prices.len(), symbols.len());
                PollEvent::Prices(prices)
            }
            Err(e) => {
                warn!("{}: price poll failed: {e}", provider.name());
                PollEvent::Failed(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use cryptochart_core::symbol::SymbolInfo;
    use cryptochart_core::timeframe::Timeframe;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves scripted responses in order, then repeats the last one.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<HashMap<String, f64>, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<HashMap<String, f64>, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExchangeProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_ticker_prices(
            &self,
            _symbols: &[String],
        ) -> Result<HashMap<String, f64>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            next.map_err(ProviderError::Parse)
        }

        async fn fetch_exchange_symbols(&self) -> Result<Vec<SymbolInfo>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch_klines(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _limit: u32,
        ) -> Result<Vec<Value>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[tokio::test]
    async fn emits_prices_and_failures_in_order() {
        let provider = ScriptedProvider::new(vec![
            Ok(prices(&[("BTCUSDT", 100.0)])),
            Err("boom".into()),
            Ok(prices(&[("BTCUSDT", 110.0)])),
        ]);
        let mut handle = spawn_price_poller(
            provider.clone(),
            vec!["BTCUSDT".into()],
            Duration::from_millis(10),
        )
        .unwrap();

        assert_eq!(
            handle.next_event().await,
            Some(PollEvent::Prices(prices(&[("BTCUSDT", 100.0)])))
        );
        assert!(matches!(handle.next_event().await, Some(PollEvent::Failed(msg)) if msg.contains("boom")));
        assert_eq!(
            handle.next_event().await,
            Some(PollEvent::Prices(prices(&[("BTCUSDT", 110.0)])))
        );
        handle.cancel().await;
    }

    #[tokio::test]
    async fn empty_watchlist_does_not_poll() {
        let provider = ScriptedProvider::new(vec![Ok(HashMap::new())]);
        assert!(spawn_price_poller(provider.clone(), Vec::new(), DEFAULT_POLL_INTERVAL).is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn retry_now_skips_the_wait() {
        let provider = ScriptedProvider::new(vec![Err("down".into()), Ok(prices(&[("ETHUSDT", 1.5)]))]);
        let mut handle = spawn_price_poller(
            provider.clone(),
            vec!["ETHUSDT".into()],
            Duration::from_secs(600),
        )
        .unwrap();

        assert!(matches!(handle.next_event().await, Some(PollEvent::Failed(_))));
        handle.retry_now();
        let event = tokio::time::timeout(Duration::from_secs(5), handle.next_event())
            .await
            .expect("retry did not trigger a poll");
        assert_eq!(event, Some(PollEvent::Prices(prices(&[("ETHUSDT", 1.5)]))));
    }

    #[tokio::test]
    async fn no_requests_after_cancel() {
        let provider = ScriptedProvider::new(vec![Ok(HashMap::new())]);
        let mut handle = spawn_price_poller(
            provider.clone(),
            vec!["BTCUSDT".into()],
            Duration::from_millis(5),
        )
        .unwrap();
        handle.next_event().await;
        handle.cancel().await;

        let after_cancel = provider.calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.calls(), after_cancel);
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let provider = ScriptedProvider::new(vec![Ok(prices(&[("BTCUSDT", 100.0)]))]);
        let mut handle = spawn_price_poller(
            provider.clone(),
            vec!["BTCUSDT".into()],
            Duration::ZERO,
        )
        .unwrap();

        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(5), handle.next_event())
                .await
                .expect("poller stalled");
            assert_eq!(event, Some(PollEvent::Prices(prices(&[("BTCUSDT", 100.0)]))));
        }
        assert!(!handle.is_finished());
        handle.cancel().await;
    }
}
