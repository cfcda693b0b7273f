use serde_json::Value;

use crate::candle::{Candle, CandleSeries};

/// Minimum positional fields in a raw kline: time, open, high, low, close, volume.
const MIN_KLINE_FIELDS: usize = 6;

/// Result of normalizing a raw kline batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub series: CandleSeries,
    /// Number of records filtered out as malformed.
    pub dropped: usize,
}

/// Parse a numeric field leniently. Unparsable or non-finite input yields `0.0`.
///
/// This is the single fallback used for every price and volume field,
/// both for REST klines and streamed candles.
pub fn lenient_f64(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn field_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => lenient_f64(s),
        _ => 0.0,
    }
}

fn field_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Convert one raw kline record into a candle, or `None` if malformed.
pub fn normalize_kline(record: &Value) -> Option<Candle> {
    let fields = record.as_array()?;
    if fields.len() < MIN_KLINE_FIELDS {
        return None;
    }

    let time = field_millis(&fields[0])? / 1000;
    if time <= 0 {
        return None;
    }

    if fields[4].is_null() {
        return None;
    }
    let close = field_f64(&fields[4]);
    if close == 0.0 && !is_unparsable_text(&fields[4]) {
        return None;
    }

    Some(Candle {
        time,
        open: field_f64(&fields[1]),
        high: field_f64(&fields[2]),
        low: field_f64(&fields[3]),
        close,
        volume: field_f64(&fields[5]),
    })
}

// A non-numeric close string is present (not zero); it degrades to 0.0 but is kept.
fn is_unparsable_text(value: &Value) -> bool {
    matches!(value, Value::String(s) if !s.trim().is_empty() && s.trim().parse::<f64>().is_err())
}

/// Normalize a batch of raw kline records, preserving input order.
pub fn normalize_klines(records: &[Value]) -> Normalized {
    let mut series = Vec::with_capacity(records.len());
    for record in records {
        if let Some(candle) = normalize_kline(record) {
            series.push(candle);
        }
    }
    Normalized {
        dropped: records.len() - series.len(),
        series,
    }
}
