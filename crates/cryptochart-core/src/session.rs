use serde_json::Value;

use crate::candle::{Candle, CandleSeries};
use crate::config::ChartConfig;
use crate::error::ChartError;
use crate::merge::{MergeOutcome, merge_closed};
use crate::normalize::normalize_klines;
use crate::timeframe::Timeframe;
use crate::trendline::{CaptureSnapshot, CommitOutcome, TrendlineCapture};
use crate::viewport::{ViewportState, sample};

/// The (symbol, timeframe) pair a chart is showing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl Selection {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

/// Proof of which request a fetch or subscription belongs to.
///
/// Results carrying a ticket from an older selection are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    selection: Selection,
}

impl LoadTicket {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { candles: usize, dropped: usize },
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    Merged(MergeOutcome),
    Stale,
}

/// Everything the renderer needs, detached from session internals.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSnapshot {
    pub selection: Selection,
    pub display: Vec<Candle>,
    pub total_candles: usize,
    pub viewport: ViewportState,
    pub capture: CaptureSnapshot,
}

/// Chart state for the active selection: canonical series, viewport,
/// derived display sequence and trendline capture.
///
/// Loads are two-step: [`ChartSession::select`] or [`ChartSession::reload`]
/// hands out a ticket, the caller fetches, then [`ChartSession::apply_load`]
/// applies the batch only if the ticket is still current.
#[derive(Debug, Clone)]
pub struct ChartSession {
    config: ChartConfig,
    selection: Selection,
    generation: u64,
    series: CandleSeries,
    display: Vec<Candle>,
    viewport: ViewportState,
    capture: TrendlineCapture,
}

impl ChartSession {
    pub fn new(config: ChartConfig, selection: Selection) -> Self {
        Self {
            config,
            selection,
            generation: 0,
            series: Vec::new(),
            display: Vec::new(),
            viewport: ViewportState::default(),
            capture: TrendlineCapture::new().with_keep_drawing(config.keep_drawing_after_ack),
        }
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn series(&self) -> &[Candle] {
        &self.series
    }

    pub fn display(&self) -> &[Candle] {
        &self.display
    }

    /// Ticket for the current selection, e.g. to tag a live subscription.
    pub fn ticket(&self) -> LoadTicket {
        LoadTicket {
            generation: self.generation,
            selection: self.selection.clone(),
        }
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Switch to a new symbol/timeframe. The series is cleared and any
    /// in-flight result for the previous selection becomes stale.
    pub fn select(&mut self, selection: Selection) -> LoadTicket {
        self.selection = selection;
        self.series.clear();
        self.display.clear();
        self.capture.reset_points();
        self.bump()
    }

    /// Re-request the current selection (manual retry). Earlier in-flight
    /// loads become stale; the current series stays until the new one lands.
    pub fn reload(&mut self) -> LoadTicket {
        self.bump()
    }

    fn bump(&mut self) -> LoadTicket {
        self.generation += 1;
        self.ticket()
    }

    /// Apply a fetched kline batch, replacing the series wholesale.
    ///
    /// A non-empty batch in which every record is malformed is an error and
    /// leaves the chart empty.
    pub fn apply_load(
        &mut self,
        ticket: &LoadTicket,
        records: &[Value],
    ) -> Result<LoadOutcome, ChartError> {
        if !self.is_current(ticket) {
            return Ok(LoadOutcome::Stale);
        }

        let normalized = normalize_klines(records);
        if normalized.series.is_empty() && !records.is_empty() {
            self.series.clear();
            self.display.clear();
            return Err(ChartError::InvalidData(format!(
                "all {} kline record(s) for {} {} were malformed",
                records.len(),
                self.selection.symbol,
                self.selection.timeframe
            )));
        }

        self.series = normalized.series;
        self.resample();
        Ok(LoadOutcome::Applied {
            candles: self.series.len(),
            dropped: normalized.dropped,
        })
    }

    /// Merge a closed candle from the live stream.
    pub fn apply_live(&mut self, ticket: &LoadTicket, candle: Candle) -> LiveOutcome {
        if !self.is_current(ticket) {
            return LiveOutcome::Stale;
        }
        let outcome = merge_closed(&mut self.series, candle);
        if outcome.changed() {
            self.resample();
        }
        LiveOutcome::Merged(outcome)
    }

    fn resample(&mut self) {
        self.display = sample(&self.series, &self.viewport, self.config.sample_rate);
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
        self.resample();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
        self.resample();
    }

    pub fn reset_zoom(&mut self) {
        self.viewport.reset();
        self.resample();
    }

    /// Move the scroll slider. Rejected while not zoomed in.
    pub fn set_scroll(&mut self, position: u8) -> Result<(), ChartError> {
        self.viewport.set_scroll(position)?;
        self.resample();
        Ok(())
    }

    pub fn toggle_drawing(&mut self) {
        self.capture.toggle_drawing();
    }

    /// Click / tap on the displayed candle at `index` (`None` = missed the data).
    pub fn commit_at(&mut self, index: Option<usize>) -> CommitOutcome {
        let candle = index.and_then(|i| self.display.get(i));
        self.capture.commit(candle)
    }

    /// Pointer move over the displayed candle at `index`.
    pub fn hover_at(&mut self, index: Option<usize>) -> bool {
        let candle = index.and_then(|i| self.display.get(i));
        self.capture.hover(candle)
    }

    pub fn acknowledge_trendline(&mut self) {
        self.capture.acknowledge();
    }

    pub fn capture(&self) -> &TrendlineCapture {
        &self.capture
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        ChartSnapshot {
            selection: self.selection.clone(),
            display: self.display.clone(),
            total_candles: self.series.len(),
            viewport: self.viewport,
            capture: self.capture.snapshot(),
        }
    }
}
