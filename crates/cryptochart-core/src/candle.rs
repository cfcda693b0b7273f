use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV candle. `time` is the bucket open in UTC epoch seconds.
///
/// `high >= max(open, close)` and `low <= min(open, close)` are expected of
/// exchange data but not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Midpoint of the candle's range, used as the trendline anchor price.
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// Bucket open time, or `None` if `time` is out of chrono's range.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        utc_from_epoch(self.time)
    }
}

/// Epoch seconds to a UTC datetime, `None` outside chrono's range.
pub fn utc_from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Candles for one (symbol, timeframe) pair, ascending by `time`.
pub type CandleSeries = Vec<Candle>;
