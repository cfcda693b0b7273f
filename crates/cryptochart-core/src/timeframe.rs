use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Candle bucket duration selectable on the chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    #[default]
    H1,
    H4,
    D1,
}

/// Interval code and display label for each timeframe.
const TIMEFRAME_TABLE: [(Timeframe, &str, &str); 6] = [
    (Timeframe::M1, "1m", "1 Minute"),
    (Timeframe::M5, "5m", "5 Minutes"),
    (Timeframe::M15, "15m", "15 Minutes"),
    (Timeframe::H1, "1h", "1 Hour"),
    (Timeframe::H4, "4h", "4 Hours"),
    (Timeframe::D1, "1d", "1 Day"),
];

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    fn entry(self) -> (Timeframe, &'static str, &'static str) {
        TIMEFRAME_TABLE[self as usize]
    }

    /// Exchange interval code, e.g. `"1h"`.
    pub fn interval(self) -> &'static str {
        self.entry().1
    }

    /// Human-readable label, e.g. `"1 Hour"`.
    pub fn label(self) -> &'static str {
        self.entry().2
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.interval())
    }
}

impl FromStr for Timeframe {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TIMEFRAME_TABLE
            .iter()
            .find(|(_, code, _)| *code == s)
            .map(|(tf, _, _)| *tf)
            .ok_or_else(|| ChartError::UnknownTimeframe(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_variants() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.entry().0, tf);
        }
    }

    #[test]
    fn parse_interval_codes() {
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::M1);
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!("1d".parse::<Timeframe>().unwrap(), Timeframe::D1);
    }

    #[test]
    fn parse_unknown_rejected() {
        let err = "2h".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, ChartError::UnknownTimeframe(s) if s == "2h"));
    }

    #[test]
    fn labels_and_display() {
        assert_eq!(Timeframe::M15.label(), "15 Minutes");
        assert_eq!(Timeframe::H1.to_string(), "1h");
        assert_eq!(Timeframe::default(), Timeframe::H1);
    }
}
