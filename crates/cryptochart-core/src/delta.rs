use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One watchlist row as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub price: Option<f64>,
    pub previous_price: Option<f64>,
    /// Percent change from `previous_price` to `price`. `None` until two
    /// usable observations exist.
    pub change_pct: Option<f64>,
}

impl WatchlistEntry {
    /// `+5.00%`, `-1.25%`, or `no data`.
    pub fn change_label(&self) -> String {
        match self.change_pct {
            Some(pct) => format!("{pct:+.2}%"),
            None => "no data".to_string(),
        }
    }

    pub fn price_label(&self) -> String {
        match self.price {
            Some(price) => format!("${price:.2}"),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Observation {
    price: Option<f64>,
    previous: Option<f64>,
    change_pct: Option<f64>,
}

/// Tracks last observed prices per watchlist symbol and derives percent
/// change between consecutive polls.
#[derive(Debug, Clone, Default)]
pub struct DeltaTracker {
    symbols: Vec<String>,
    observations: HashMap<String, Observation>,
    error: Option<String>,
}

impl DeltaTracker {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tracker = Self::default();
        for symbol in symbols {
            tracker.add(symbol);
        }
        tracker
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Start tracking a symbol. Returns `false` if it was already tracked.
    pub fn add(&mut self, symbol: impl Into<String>) -> bool {
        let symbol = symbol.into();
        if self.symbols.contains(&symbol) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    /// Stop tracking a symbol and forget its prices.
    pub fn remove(&mut self, symbol: &str) -> bool {
        let before = self.symbols.len();
        self.symbols.retain(|s| s != symbol);
        self.observations.remove(symbol);
        self.symbols.len() != before
    }

    /// Apply a successful poll. Symbols missing from `snapshot` keep their
    /// last price and change.
    pub fn apply_snapshot(&mut self, snapshot: &HashMap<String, f64>) {
        for symbol in &self.symbols {
            let Some(&price) = snapshot.get(symbol) else {
                continue;
            };
            let obs = self.observations.entry(symbol.clone()).or_default();
            if let Some(change) = obs.price.and_then(|old| percent_change(old, price)) {
                obs.change_pct = Some(change);
            }
            obs.previous = obs.price;
            obs.price = Some(price);
        }
        self.error = None;
    }

    /// Record a failed poll. Existing prices and changes stay in place.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Retryable error from the most recent poll, if it failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn entry(&self, symbol: &str) -> Option<WatchlistEntry> {
        if !self.symbols.iter().any(|s| s == symbol) {
            return None;
        }
        let obs = self.observations.get(symbol).copied().unwrap_or_default();
        Some(WatchlistEntry {
            symbol: symbol.to_string(),
            price: obs.price,
            previous_price: obs.previous,
            change_pct: obs.change_pct,
        })
    }

    /// Rows in watchlist order.
    pub fn entries(&self) -> Vec<WatchlistEntry> {
        self.symbols
            .iter()
            .filter_map(|symbol| self.entry(symbol))
            .collect()
    }
}

/// `(new - old) / old * 100`, or `None` when either price is non-finite or
/// `old` is zero.
pub fn percent_change(old: f64, new: f64) -> Option<f64> {
    if !old.is_finite() || !new.is_finite() || old == 0.0 {
        return None;
    }
    let change = (new - old) / old * 100.0;
    change.is_finite().then_some(change)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[test]
    fn five_percent_rise() {
        let mut tracker = DeltaTracker::new(["BTCUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 100.0)]));
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 105.0)]));

        let entry = tracker.entry("BTCUSDT").unwrap();
        assert_eq!(entry.price, Some(105.0));
        assert_eq!(entry.previous_price, Some(100.0));
        assert_eq!(entry.change_label(), "+5.00%");
    }

    #[test]
    fn negative_change_label() {
        let mut tracker = DeltaTracker::new(["ETHUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("ETHUSDT", 200.0)]));
        tracker.apply_snapshot(&snapshot(&[("ETHUSDT", 197.5)]));
        assert_eq!(tracker.entry("ETHUSDT").unwrap().change_label(), "-1.25%");
    }

    #[test]
    fn first_poll_has_no_change() {
        let mut tracker = DeltaTracker::new(["BTCUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 100.0)]));
        let entry = tracker.entry("BTCUSDT").unwrap();
        assert_eq!(entry.change_pct, None);
        assert_eq!(entry.change_label(), "no data");
        assert_eq!(entry.price_label(), "$100.00");
    }

    #[test]
    fn zero_previous_price_is_guarded() {
        let mut tracker = DeltaTracker::new(["BTCUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 0.0)]));
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 50.0)]));
        let entry = tracker.entry("BTCUSDT").unwrap();
        assert_eq!(entry.change_pct, None);
        assert_eq!(entry.price, Some(50.0));
    }

    #[test]
    fn missing_symbol_keeps_last_values() {
        let mut tracker = DeltaTracker::new(["BTCUSDT", "ETHUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 100.0), ("ETHUSDT", 10.0)]));
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 110.0), ("ETHUSDT", 11.0)]));
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 121.0)]));

        let eth = tracker.entry("ETHUSDT").unwrap();
        assert_eq!(eth.price, Some(11.0));
        assert_eq!(eth.change_label(), "+10.00%");

        let btc = tracker.entry("BTCUSDT").unwrap();
        assert_eq!(btc.price, Some(121.0));
        assert_eq!(btc.change_label(), "+10.00%");
    }

    #[test]
    fn failure_preserves_data() {
        let mut tracker = DeltaTracker::new(["BTCUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 100.0)]));
        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 105.0)]));
        let before = tracker.entries();

        tracker.record_failure("Failed to fetch latest prices");
        assert_eq!(tracker.error(), Some("Failed to fetch latest prices"));
        assert_eq!(tracker.entries(), before);

        tracker.apply_snapshot(&snapshot(&[("BTCUSDT", 105.0)]));
        assert_eq!(tracker.error(), None);
        assert_eq!(tracker.entry("BTCUSDT").unwrap().change_label(), "+0.00%");
    }

    #[test]
    fn untracked_symbols_in_snapshot_ignored() {
        let mut tracker = DeltaTracker::new(["BTCUSDT"]);
        tracker.apply_snapshot(&snapshot(&[("DOGEUSDT", 0.1)]));
        assert!(tracker.entry("DOGEUSDT").is_none());
        assert_eq!(tracker.entries().len(), 1);
    }

    #[test]
    fn add_and_remove_keep_order() {
        let mut tracker = DeltaTracker::new(["BTCUSDT", "ETHUSDT"]);
        assert!(!tracker.add("BTCUSDT"));
        assert!(tracker.add("BNBUSDT"));
        assert!(tracker.remove("ETHUSDT"));
        assert!(!tracker.remove("ETHUSDT"));
        let symbols: Vec<String> = tracker.entries().into_iter().map(|e| e.symbol).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "BNBUSDT"]);
    }

    #[test]
    fn percent_change_guards() {
        assert_eq!(percent_change(100.0, 105.0), Some(5.0));
        assert_eq!(percent_change(0.0, 105.0), None);
        assert_eq!(percent_change(f64::NAN, 105.0), None);
        assert_eq!(percent_change(100.0, f64::INFINITY), None);
    }
}
