use std::num::NonZeroUsize;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::error::ChartError;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 10.0;
pub const MAX_SCROLL: u8 = 100;

/// Zoom factor and scroll offset for the chart window.
///
/// Zooming doubles or halves the level within `[1, 10]`, so levels such as
/// 5, 2.5 and 1.25 are reachable on the way back out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    zoom_level: f64,
    scroll_position: u8,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom_level: MIN_ZOOM,
            scroll_position: 0,
        }
    }
}

impl ViewportState {
    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    pub fn scroll_position(&self) -> u8 {
        self.scroll_position
    }

    pub fn is_zoomed(&self) -> bool {
        self.zoom_level > MIN_ZOOM
    }

    pub fn zoom_in(&mut self) {
        self.zoom_level = (self.zoom_level * 2.0).min(MAX_ZOOM);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_level = (self.zoom_level / 2.0).max(MIN_ZOOM);
    }

    /// Back to the full series: zoom 1, scroll 0.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Move the visible window. Positions above 100 clamp to 100.
    ///
    /// Rejected at zoom level 1, where the whole series is already visible.
    pub fn set_scroll(&mut self, position: u8) -> Result<(), ChartError> {
        if !self.is_zoomed() {
            return Err(ChartError::InputRejected(
                "zoom in first to use the scroll slider".into(),
            ));
        }
        self.scroll_position = position.min(MAX_SCROLL);
        Ok(())
    }

    /// Index range of the series visible under this viewport.
    pub fn visible_range(&self, len: usize) -> Range<usize> {
        if len == 0 {
            return 0..0;
        }
        let visible = ((len as f64 / self.zoom_level).floor() as usize).clamp(1, len);
        let max_start = len - visible;
        let start = ((max_start as f64 * (self.scroll_position as f64 / 100.0)).floor() as usize)
            .min(max_start);
        start..(start + visible).min(len)
    }
}

/// Derive the display sequence: slice the visible window, then keep every
/// `sample_rate`-th candle of that slice.
///
/// Pure and restartable; no state carries over between calls.
pub fn sample(series: &[Candle], viewport: &ViewportState, sample_rate: NonZeroUsize) -> Vec<Candle> {
    let range = viewport.visible_range(series.len());
    series[range]
        .iter()
        .step_by(sample_rate.get())
        .copied()
        .collect()
}
