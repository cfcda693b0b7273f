use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::candle::{Candle, utc_from_epoch};

/// A chart-space point: `x` in epoch seconds, `y` in price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendlinePoint {
    pub x: f64,
    pub y: f64,
}

impl TrendlinePoint {
    /// Anchor on a candle: its open time and the midpoint of its range.
    pub fn from_candle(candle: &Candle) -> Self {
        Self {
            x: candle.time as f64,
            y: candle.midpoint(),
        }
    }
}

/// A committed two-point trendline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    pub start: TrendlinePoint,
    pub end: TrendlinePoint,
}

/// Formatted trendline details shown when a line is completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendlineSummary {
    pub start_price: String,
    pub start_time: String,
    pub end_price: String,
    pub end_time: String,
}

fn format_point_time(x: f64, tz: Tz) -> String {
    match utc_from_epoch(x.trunc() as i64) {
        Some(ts) => ts.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => "-".to_string(),
    }
}

impl Trendline {
    pub fn summary(&self, tz: Tz) -> TrendlineSummary {
        TrendlineSummary {
            start_price: format!("{:.2}", self.start.y),
            start_time: format_point_time(self.start.x, tz),
            end_price: format!("{:.2}", self.end.y),
            end_time: format_point_time(self.end.x, tz),
        }
    }
}

/// Where the two-click capture currently stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    /// Drawing mode off.
    Idle,
    /// Drawing mode on, nothing captured yet.
    Armed,
    /// First point captured; `preview` follows the pointer.
    OnePoint {
        start: TrendlinePoint,
        preview: Option<TrendlinePoint>,
    },
    /// Both points captured, waiting for the user to acknowledge.
    Complete(Trendline),
}

/// Result of a commit (click / tap) interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommitOutcome {
    /// Drawing mode off or no data point under the pointer.
    Ignored,
    /// A new line was started at this point.
    Started(TrendlinePoint),
    /// The second point landed; the finished line is ready for acknowledgment.
    Completed(Trendline),
}

/// Immutable view of the capture for rendering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureSnapshot {
    pub drawing: bool,
    pub points: Vec<TrendlinePoint>,
    /// Preview segment while one point is held, fixed segment once complete.
    pub segment: Option<(TrendlinePoint, TrendlinePoint)>,
}

/// Two-click trendline capture driven by pointer and touch events.
#[derive(Debug, Clone)]
pub struct TrendlineCapture {
    state: CaptureState,
    keep_drawing_after_ack: bool,
}

impl Default for TrendlineCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendlineCapture {
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            keep_drawing_after_ack: false,
        }
    }

    /// When set, acknowledging a completed line re-arms drawing mode
    /// instead of switching it off.
    pub fn with_keep_drawing(mut self, keep: bool) -> Self {
        self.keep_drawing_after_ack = keep;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        !matches!(self.state, CaptureState::Idle)
    }

    /// Flip drawing mode. Turning it off clears everything captured.
    pub fn toggle_drawing(&mut self) {
        self.state = match self.state {
            CaptureState::Idle => CaptureState::Armed,
            _ => CaptureState::Idle,
        };
    }

    /// Handle a click or tap. `candle` is the displayed candle under the
    /// pointer, or `None` if the interaction missed the data.
    ///
    /// A commit while `Complete` starts a new line rather than being blocked.
    pub fn commit(&mut self, candle: Option<&Candle>) -> CommitOutcome {
        let Some(candle) = candle else {
            return CommitOutcome::Ignored;
        };
        let point = TrendlinePoint::from_candle(candle);

        match self.state {
            CaptureState::Idle => CommitOutcome::Ignored,
            CaptureState::Armed | CaptureState::Complete(_) => {
                self.state = CaptureState::OnePoint {
                    start: point,
                    preview: None,
                };
                CommitOutcome::Started(point)
            }
            CaptureState::OnePoint { start, .. } => {
                let line = Trendline { start, end: point };
                self.state = CaptureState::Complete(line);
                CommitOutcome::Completed(line)
            }
        }
    }

    /// Handle a pointer move. Only updates the preview while one point is held.
    /// Returns whether the preview changed.
    pub fn hover(&mut self, candle: Option<&Candle>) -> bool {
        let Some(candle) = candle else {
            return false;
        };
        let CaptureState::OnePoint { preview, .. } = &mut self.state else {
            return false;
        };
        let point = TrendlinePoint::from_candle(candle);
        if *preview == Some(point) {
            return false;
        }
        *preview = Some(point);
        true
    }

    /// Dismiss the completed-line acknowledgment. No effect in other states.
    pub fn acknowledge(&mut self) {
        if let CaptureState::Complete(_) = self.state {
            self.state = if self.keep_drawing_after_ack {
                CaptureState::Armed
            } else {
                CaptureState::Idle
            };
        }
    }

    /// Drop captured points but keep drawing mode as it is.
    pub fn reset_points(&mut self) {
        if self.is_drawing() {
            self.state = CaptureState::Armed;
        }
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        match self.state {
            CaptureState::Idle => CaptureSnapshot::default(),
            CaptureState::Armed => CaptureSnapshot {
                drawing: true,
                ..Default::default()
            },
            CaptureState::OnePoint { start, preview } => CaptureSnapshot {
                drawing: true,
                points: vec![start],
                segment: preview.map(|p| (start, p)),
            },
            CaptureState::Complete(line) => CaptureSnapshot {
                drawing: true,
                points: vec![line.start, line.end],
                segment: Some((line.start, line.end)),
            },
        }
    }
}

/// Horizontal plot extent in pixels, with candles laid out in equal bands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub left: f64,
    pub width: f64,
}

impl PlotArea {
    pub fn new(left: f64, width: f64) -> Self {
        Self { left, width }
    }

    /// Index of the band under pixel `px` for `count` displayed candles.
    pub fn index_at(&self, px: f64, count: usize) -> Option<usize> {
        if count == 0 || self.width <= 0.0 {
            return None;
        }
        let offset = px - self.left;
        if !(0.0..self.width).contains(&offset) {
            return None;
        }
        let band = self.width / count as f64;
        Some(((offset / band).floor() as usize).min(count - 1))
    }

    pub fn candle_at<'a>(&self, px: f64, display: &'a [Candle]) -> Option<&'a Candle> {
        self.index_at(px, display.len()).map(|i| &display[i])
    }
}

/// Index of the displayed candle whose time is closest to `x` (epoch seconds).
/// Ties resolve to the earlier candle.
pub fn nearest_index_by_time(display: &[Candle], x: f64) -> Option<usize> {
    let idx = display.partition_point(|c| (c.time as f64) < x);
    match (idx.checked_sub(1), display.get(idx)) {
        (Some(before), Some(after)) => {
            if x - display[before].time as f64 <= after.time as f64 - x {
                Some(before)
            } else {
                Some(idx)
            }
        }
        (Some(before), None) => Some(before),
        (None, Some(_)) => Some(idx),
        (None, None) => None,
    }
}

/// Displayed candle whose time is closest to `x` (epoch seconds).
pub fn nearest_by_time(display: &[Candle], x: f64) -> Option<&Candle> {
    nearest_index_by_time(display, x).map(|i| &display[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, high: f64, low: f64) -> Candle {
        Candle {
            time,
            open: low,
            high,
            low,
            close: high,
            volume: 1.0,
        }
    }

    fn armed() -> TrendlineCapture {
        let mut capture = TrendlineCapture::new();
        capture.toggle_drawing();
        capture
    }

    #[test]
    fn starts_idle_and_ignores_commits() {
        let mut capture = TrendlineCapture::new();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(
            capture.commit(Some(&candle(1000, 12.0, 9.0))),
            CommitOutcome::Ignored
        );
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn two_commits_complete_a_line() {
        let mut capture = armed();
        assert_eq!(capture.state(), CaptureState::Armed);

        let first = capture.commit(Some(&candle(1000, 12.0, 9.0)));
        assert_eq!(
            first,
            CommitOutcome::Started(TrendlinePoint { x: 1000.0, y: 10.5 })
        );

        let second = capture.commit(Some(&candle(2000, 11.0, 8.0)));
        let expected = Trendline {
            start: TrendlinePoint { x: 1000.0, y: 10.5 },
            end: TrendlinePoint { x: 2000.0, y: 9.5 },
        };
        assert_eq!(second, CommitOutcome::Completed(expected));
        assert_eq!(capture.state(), CaptureState::Complete(expected));

        let snap = capture.snapshot();
        assert_eq!(snap.points, vec![expected.start, expected.end]);
        assert_eq!(snap.segment, Some((expected.start, expected.end)));
    }

    #[test]
    fn hover_updates_preview_only() {
        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));

        assert!(capture.hover(Some(&candle(1500, 14.0, 10.0))));
        assert!(!capture.hover(Some(&candle(1500, 14.0, 10.0))));
        let snap = capture.snapshot();
        assert_eq!(snap.points, vec![TrendlinePoint { x: 1000.0, y: 10.5 }]);
        assert_eq!(
            snap.segment,
            Some((
                TrendlinePoint { x: 1000.0, y: 10.5 },
                TrendlinePoint { x: 1500.0, y: 12.0 }
            ))
        );

        capture.commit(Some(&candle(2000, 11.0, 8.0)));
        assert_eq!(
            capture.snapshot().segment,
            Some((
                TrendlinePoint { x: 1000.0, y: 10.5 },
                TrendlinePoint { x: 2000.0, y: 9.5 }
            ))
        );
    }

    #[test]
    fn hover_ignored_outside_one_point() {
        let mut idle = TrendlineCapture::new();
        assert!(!idle.hover(Some(&candle(1000, 2.0, 1.0))));

        let mut capture = armed();
        assert!(!capture.hover(Some(&candle(1000, 2.0, 1.0))));
        assert_eq!(capture.snapshot().segment, None);

        capture.commit(Some(&candle(1000, 2.0, 1.0)));
        assert!(!capture.hover(None));
        capture.commit(Some(&candle(2000, 2.0, 1.0)));
        assert!(!capture.hover(Some(&candle(3000, 2.0, 1.0))));
    }

    #[test]
    fn commit_missing_data_is_ignored() {
        let mut capture = armed();
        assert_eq!(capture.commit(None), CommitOutcome::Ignored);
        assert_eq!(capture.state(), CaptureState::Armed);
    }

    #[test]
    fn third_commit_starts_new_line() {
        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.commit(Some(&candle(2000, 11.0, 8.0)));
        let outcome = capture.commit(Some(&candle(3000, 20.0, 10.0)));
        assert_eq!(
            outcome,
            CommitOutcome::Started(TrendlinePoint { x: 3000.0, y: 15.0 })
        );
        assert_eq!(capture.snapshot().points.len(), 1);
        assert_eq!(capture.snapshot().segment, None);
    }

    #[test]
    fn toggle_off_clears_from_any_state() {
        let mut capture = armed();
        capture.toggle_drawing();
        assert_eq!(capture.snapshot(), CaptureSnapshot::default());

        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.hover(Some(&candle(2000, 12.0, 9.0)));
        capture.toggle_drawing();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.snapshot(), CaptureSnapshot::default());

        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.commit(Some(&candle(2000, 12.0, 9.0)));
        capture.toggle_drawing();
        assert_eq!(capture.snapshot(), CaptureSnapshot::default());
    }

    #[test]
    fn acknowledge_switches_drawing_off_by_default() {
        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.commit(Some(&candle(2000, 11.0, 8.0)));
        capture.acknowledge();
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[test]
    fn acknowledge_rearms_when_configured() {
        let mut capture = TrendlineCapture::new().with_keep_drawing(true);
        capture.toggle_drawing();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.commit(Some(&candle(2000, 11.0, 8.0)));
        capture.acknowledge();
        assert_eq!(capture.state(), CaptureState::Armed);
        assert!(capture.snapshot().points.is_empty());
    }

    #[test]
    fn acknowledge_outside_complete_is_noop() {
        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.acknowledge();
        assert!(matches!(capture.state(), CaptureState::OnePoint { .. }));
    }

    #[test]
    fn reset_points_keeps_drawing_mode() {
        let mut capture = armed();
        capture.commit(Some(&candle(1000, 12.0, 9.0)));
        capture.reset_points();
        assert_eq!(capture.state(), CaptureState::Armed);

        let mut idle = TrendlineCapture::new();
        idle.reset_points();
        assert_eq!(idle.state(), CaptureState::Idle);
    }

    #[test]
    fn summary_formats_prices_and_times() {
        let line = Trendline {
            start: TrendlinePoint { x: 1_736_942_400.0, y: 10.5 },
            end: TrendlinePoint { x: 1_736_946_000.0, y: 9.456 },
        };
        let summary = line.summary(Tz::UTC);
        assert_eq!(summary.start_price, "10.50");
        assert_eq!(summary.end_price, "9.46");
        assert_eq!(summary.start_time, "2025-01-15 12:00:00 UTC");
        assert_eq!(summary.end_time, "2025-01-15 13:00:00 UTC");

        let ny = line.summary(chrono_tz::America::New_York);
        assert_eq!(ny.start_time, "2025-01-15 07:00:00 EST");
    }

    #[test]
    fn plot_area_maps_pixels_to_bands() {
        let area = PlotArea::new(10.0, 100.0);
        assert_eq!(area.index_at(10.0, 4), Some(0));
        assert_eq!(area.index_at(34.9, 4), Some(0));
        assert_eq!(area.index_at(35.0, 4), Some(1));
        assert_eq!(area.index_at(109.9, 4), Some(3));
        assert_eq!(area.index_at(110.0, 4), None);
        assert_eq!(area.index_at(9.0, 4), None);
        assert_eq!(area.index_at(50.0, 0), None);
    }

    #[test]
    fn plot_area_candle_lookup() {
        let display = vec![candle(1000, 2.0, 1.0), candle(2000, 4.0, 3.0)];
        let area = PlotArea::new(0.0, 200.0);
        assert_eq!(area.candle_at(150.0, &display).unwrap().time, 2000);
        assert!(area.candle_at(-1.0, &display).is_none());
    }

    #[test]
    fn nearest_by_time_picks_closest() {
        let display = vec![
            candle(1000, 2.0, 1.0),
            candle(2000, 2.0, 1.0),
            candle(3000, 2.0, 1.0),
        ];
        assert_eq!(nearest_by_time(&display, 0.0).unwrap().time, 1000);
        assert_eq!(nearest_by_time(&display, 1400.0).unwrap().time, 1000);
        assert_eq!(nearest_by_time(&display, 1500.0).unwrap().time, 1000);
        assert_eq!(nearest_by_time(&display, 1600.0).unwrap().time, 2000);
        assert_eq!(nearest_by_time(&display, 2000.0).unwrap().time, 2000);
        assert_eq!(nearest_by_time(&display, 9000.0).unwrap().time, 3000);
        assert!(nearest_by_time(&[], 1000.0).is_none());
    }

    #[test]
    fn nearest_index_matches_candle_lookup() {
        let display = vec![candle(1000, 2.0, 1.0), candle(2000, 2.0, 1.0)];
        assert_eq!(nearest_index_by_time(&display, 1499.0), Some(0));
        assert_eq!(nearest_index_by_time(&display, 1501.0), Some(1));
        assert_eq!(nearest_index_by_time(&display[..1], 5000.0), Some(0));
        assert_eq!(nearest_index_by_time(&[], 5000.0), None);
    }
}
