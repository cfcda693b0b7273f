use crate::candle::Candle;

/// What happened to a closed candle pushed from the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Same bucket as the last candle; the last candle was replaced.
    Replaced,
    /// Newer bucket; appended to the end.
    Appended,
    /// Older than the last candle; ignored.
    Discarded,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, MergeOutcome::Discarded)
    }
}

/// Merge a closed candle into a time-ascending series.
///
/// Never inserts mid-sequence: anything older than the last candle is dropped.
pub fn merge_closed(series: &mut Vec<Candle>, candle: Candle) -> MergeOutcome {
    match series.last().map(|last| last.time) {
        Some(last_time) if candle.time < last_time => MergeOutcome::Discarded,
        Some(last_time) if candle.time == last_time => {
            if let Some(last) = series.last_mut() {
                *last = candle;
            }
            MergeOutcome::Replaced
        }
        _ => {
            series.push(candle);
            MergeOutcome::Appended
        }
    }
}
