use std::num::NonZeroUsize;

/// Default stride for display downsampling.
pub const DEFAULT_SAMPLE_RATE: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

/// Default number of historical bars requested per load.
pub const DEFAULT_KLINE_LIMIT: u32 = 1000;

/// Chart pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartConfig {
    /// Keep every Nth candle of the visible window.
    pub sample_rate: NonZeroUsize,
    pub kline_limit: u32,
    /// Re-arm drawing mode after a completed trendline is acknowledged.
    pub keep_drawing_after_ack: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            kline_limit: DEFAULT_KLINE_LIMIT,
            keep_drawing_after_ack: false,
        }
    }
}

impl ChartConfig {
    /// Override the sample rate. Zero is treated as 1 (no downsampling).
    pub fn with_sample_rate(mut self, rate: usize) -> Self {
        self.sample_rate = NonZeroUsize::new(rate).unwrap_or(NonZeroUsize::MIN);
        self
    }
}
