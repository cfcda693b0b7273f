use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use cryptochart_core::candle::Candle;
use cryptochart_core::config::ChartConfig;
use cryptochart_core::delta::{DeltaTracker, WatchlistEntry};
use cryptochart_core::error::ChartError;
use cryptochart_core::session::{ChartSession, ChartSnapshot, LiveOutcome, LoadOutcome, LoadTicket, Selection};
use cryptochart_core::store::WatchlistStore;
use cryptochart_core::symbol::filter_symbols;
use cryptochart_core::timeframe::Timeframe;
use cryptochart_core::trendline::{CommitOutcome, Trendline, nearest_index_by_time};
use cryptochart_providers::binance::{BINANCE_API_BASE_URL, BinanceProvider};
use cryptochart_providers::poll::{PollEvent, spawn_price_poller};
use cryptochart_providers::provider::ExchangeProvider;
use cryptochart_providers::stream::{BINANCE_WS_BASE_URL, StreamConfig, subscribe_candle_closes};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(
    name = "cryptochart",
    about = "Crypto candlestick charts, trendlines and a live watchlist"
)]
struct Cli {
    /// Directory holding watchlist.json (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// REST API base URL
    #[arg(long, default_value = BINANCE_API_BASE_URL)]
    api_url: String,

    /// WebSocket stream base URL
    #[arg(long, default_value = BINANCE_WS_BASE_URL)]
    ws_url: String,

    #[command(subcommand)]
    command: Commands,
}

/// Selection and viewport options shared by chart-style commands.
#[derive(Args, Debug)]
struct ChartArgs {
    /// Trading pair, e.g. BTCUSDT
    #[arg(short, long, default_value = "BTCUSDT")]
    symbol: String,

    /// Timeframe: 1m, 5m, 15m, 1h, 4h, 1d
    #[arg(short, long, default_value = "1h")]
    timeframe: Timeframe,

    /// Number of zoom-in steps (each doubles, capped at 10x)
    #[arg(long, default_value_t = 0)]
    zoom: u8,

    /// Scroll position 0-100 (requires --zoom)
    #[arg(long)]
    scroll: Option<u8>,

    /// Keep every Nth candle of the visible window
    #[arg(long, default_value_t = 10)]
    sample_rate: usize,

    /// Number of klines to request
    #[arg(long, default_value_t = 1000)]
    limit: u32,

    /// Timezone for displayed times
    #[arg(long, default_value = "UTC")]
    tz: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print a downsampled chart window
    Chart {
        #[command(flatten)]
        chart: ChartArgs,

        /// Keep running and merge closed candles from the live stream
        #[arg(long)]
        follow: bool,
    },

    /// Draw a trendline between two displayed candles
    Trendline {
        #[command(flatten)]
        chart: ChartArgs,

        /// First point: display index, or a date-time in --tz (2025-01-15T12:00)
        #[arg(long)]
        from: PointArg,

        /// Second point: display index, or a date-time in --tz
        #[arg(long)]
        to: PointArg,
    },

    /// Poll watchlist prices and print percent changes
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,

        /// Stop after this many polls (runs until Ctrl-C if omitted)
        #[arg(long)]
        polls: Option<usize>,
    },

    /// Manage the saved watchlist
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },

    /// Search tradable symbols
    Search {
        /// Case-insensitive text matched against symbol, base and quote asset
        #[arg(default_value = "")]
        query: String,

        /// Maximum number of results to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WatchlistAction {
    /// Add a symbol
    Add { symbol: String },
    /// Remove a symbol
    Remove { symbol: String },
    /// Show saved symbols
    List,
}

/// A trendline anchor given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PointArg {
    Index(usize),
    /// Local date-time, snapped to the nearest displayed candle.
    Time(NaiveDateTime),
}

const POINT_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

impl FromStr for PointArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Ok(PointArg::Index(index));
        }
        POINT_TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(PointArg::Time)
            .ok_or_else(|| format!("expected a display index or a date-time like 2025-01-15T12:00, got '{s}'"))
    }
}

impl fmt::Display for PointArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointArg::Index(i) => write!(f, "display index {i}"),
            PointArg::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl PointArg {
    /// Display index this point selects, if any.
    fn resolve(self, display: &[Candle], tz: Tz) -> Option<usize> {
        match self {
            PointArg::Index(i) => Some(i),
            PointArg::Time(local) => {
                let at = tz.from_local_datetime(&local).earliest()?;
                nearest_index_by_time(display, at.timestamp() as f64)
            }
        }
    }
}

fn create_provider(api_url: &str) -> Arc<dyn ExchangeProvider> {
    Arc::new(BinanceProvider::with_base_url(api_url.to_string()))
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("invalid timezone '{name}': {e}"))
}

fn format_time(candle: &Candle, tz: Tz) -> String {
    match candle.timestamp() {
        Some(ts) => ts.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Fetch klines for `ticket` and apply them to the session.
async fn load_chart(
    provider: &dyn ExchangeProvider,
    session: &mut ChartSession,
    ticket: &LoadTicket,
) -> Result<LoadOutcome> {
    let selection = ticket.selection();
    let records = provider
        .fetch_klines(&selection.symbol, selection.timeframe, session.config().kline_limit)
        .await
        .with_context(|| format!("failed to fetch klines for {}", selection.symbol))?;

    let outcome = session.apply_load(ticket, &records)?;
    match outcome {
        LoadOutcome::Applied { candles, dropped } => {
            if dropped > 0 {
                warn!("{}: dropped {dropped} malformed kline record(s)", selection.symbol);
            }
            info!("{} {}: loaded {candles} candle(s)", selection.symbol, selection.timeframe);
        }
        LoadOutcome::Stale => {
            info!(
                "discarding stale kline batch for {} {}",
                selection.symbol, selection.timeframe
            );
        }
    }
    Ok(outcome)
}

/// Apply zoom steps and scroll. A rejected scroll is reported, not fatal.
fn apply_view(session: &mut ChartSession, zoom_steps: u8, scroll: Option<u8>) {
    for _ in 0..zoom_steps {
        session.zoom_in();
    }
    if let Some(position) = scroll {
        match session.set_scroll(position) {
            Ok(()) => {}
            Err(ChartError::InputRejected(notice)) => println!("Note: {notice}"),
            Err(e) => warn!("scroll failed: {e}"),
        }
    }
}

fn print_snapshot(snapshot: &ChartSnapshot, tz: Tz) {
    let viewport = snapshot.viewport;
    println!(
        "{} {}: zoom {}x, scroll {}%, showing {} of {} candle(s)",
        snapshot.selection.symbol,
        snapshot.selection.timeframe.label(),
        viewport.zoom_level(),
        viewport.scroll_position(),
        snapshot.display.len(),
        snapshot.total_candles
    );
    if snapshot.display.is_empty() {
        println!("No data available.");
        return;
    }

    println!(
        "{:>4}  {:<16}  {:>12}  {:>12}  {:>12}  {:>12}  {:>14}",
        "#", "time", "open", "high", "low", "close", "volume"
    );
    for (i, candle) in snapshot.display.iter().enumerate() {
        let marker = if candle.is_bullish() { '+' } else { '-' };
        println!(
            "{i:>4}  {:<16}  {:>12.2}  {:>12.2}  {:>12.2}  {:>12.2}  {:>14.2} {marker}",
            format_time(candle, tz),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume
        );
    }
}

fn new_session(chart: &ChartArgs) -> ChartSession {
    let config = ChartConfig::default().with_sample_rate(chart.sample_rate);
    let config = ChartConfig {
        kline_limit: chart.limit,
        ..config
    };
    ChartSession::new(
        config,
        Selection::new(chart.symbol.to_uppercase(), chart.timeframe),
    )
}

async fn cmd_chart(cli: &Cli, chart: &ChartArgs, follow: bool) -> Result<()> {
    let tz = parse_tz(&chart.tz)?;
    let provider = create_provider(&cli.api_url);
    let mut session = new_session(chart);
    let ticket = session.ticket();

    load_chart(provider.as_ref(), &mut session, &ticket).await?;
    apply_view(&mut session, chart.zoom, chart.scroll);
    print_snapshot(&session.snapshot(), tz);

    if !follow {
        return Ok(());
    }

    let config = StreamConfig {
        base_url: cli.ws_url.clone(),
        ..StreamConfig::default()
    };
    let selection = session.selection().clone();
    let mut subscription = subscribe_candle_closes(config, &selection.symbol, selection.timeframe);
    info!("following {} {} (Ctrl-C to stop)", selection.symbol, selection.timeframe);

    loop {
        tokio::select! {
            next = subscription.next_closed() => {
                let Some(candle) = next else {
                    warn!("live stream stopped; chart will no longer update");
                    break;
                };
                match session.apply_live(&ticket, candle) {
                    LiveOutcome::Merged(outcome) if outcome.changed() => {
                        debug!("live candle {}: {outcome:?}", candle.time);
                        print_snapshot(&session.snapshot(), tz);
                    }
                    LiveOutcome::Merged(_) => {
                        debug!("ignoring out-of-order live candle {}", candle.time);
                    }
                    LiveOutcome::Stale => info!("discarding stale live candle {}", candle.time),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(exit) = subscription.unsubscribe().await {
        debug!("live stream exit: {exit:?}");
    }
    Ok(())
}

async fn cmd_trendline(cli: &Cli, chart: &ChartArgs, from: PointArg, to: PointArg) -> Result<()> {
    let tz = parse_tz(&chart.tz)?;
    let provider = create_provider(&cli.api_url);
    let mut session = new_session(chart);
    let ticket = session.ticket();

    load_chart(provider.as_ref(), &mut session, &ticket).await?;
    apply_view(&mut session, chart.zoom, chart.scroll);

    let line = draw_trendline(&mut session, from, to, tz)?;
    let summary = line.summary(tz);
    println!("Trendline on {} {}", chart.symbol.to_uppercase(), chart.timeframe.label());
    println!("  start: {} at {}", summary.start_price, summary.start_time);
    println!("  end:   {} at {}", summary.end_price, summary.end_time);
    session.acknowledge_trendline();
    Ok(())
}

/// Arm drawing mode and commit two displayed candles.
fn draw_trendline(
    session: &mut ChartSession,
    from: PointArg,
    to: PointArg,
    tz: Tz,
) -> Result<Trendline> {
    let shown = session.display().len();
    if !session.capture().is_drawing() {
        session.toggle_drawing();
    }

    let start = from.resolve(session.display(), tz);
    if session.commit_at(start) == CommitOutcome::Ignored {
        anyhow::bail!("no candle at {from} ({shown} shown)");
    }
    let end = to.resolve(session.display(), tz);
    session.hover_at(end);
    match session.commit_at(end) {
        CommitOutcome::Completed(line) => Ok(line),
        _ => anyhow::bail!("no candle at {to} ({shown} shown)"),
    }
}

fn print_watchlist(entries: &[WatchlistEntry], error: Option<&str>) {
    println!("{:<12}  {:>16}  {:>10}", "symbol", "price", "change");
    for entry in entries {
        println!(
            "{:<12}  {:>16}  {:>10}",
            entry.symbol,
            entry.price_label(),
            entry.change_label()
        );
    }
    if let Some(error) = error {
        println!("Error: {error} (will retry)");
    }
}

async fn cmd_watch(cli: &Cli, interval_secs: u64, polls: Option<usize>) -> Result<()> {
    let store = WatchlistStore::new(&cli.data_dir);
    let symbols = store.load().context("failed to load watchlist")?;
    let mut tracker = DeltaTracker::new(symbols.iter().cloned());

    let interval = Duration::from_secs(interval_secs);
    let Some(mut poller) = spawn_price_poller(create_provider(&cli.api_url), symbols, interval)
    else {
        println!("Watchlist is empty. Add a symbol with `cryptochart watchlist add <SYMBOL>`.");
        return Ok(());
    };

    let mut seen = 0;
    while polls.is_none_or(|limit| seen < limit) {
        tokio::select! {
            event = poller.next_event() => {
                match event {
                    Some(PollEvent::Prices(prices)) => tracker.apply_snapshot(&prices),
                    Some(PollEvent::Failed(message)) => tracker.record_failure(message),
                    None => break,
                }
                seen += 1;
                print_watchlist(&tracker.entries(), tracker.error());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.cancel().await;
    Ok(())
}

fn cmd_watchlist(store: &WatchlistStore, action: &WatchlistAction) -> Result<()> {
    match action {
        WatchlistAction::Add { symbol } => {
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() {
                anyhow::bail!("symbol must not be empty");
            }
            if store.add(&symbol).context("failed to update watchlist")? {
                println!("Added {symbol}");
            } else {
                println!("{symbol} is already in the watchlist");
            }
        }
        WatchlistAction::Remove { symbol } => {
            let symbol = symbol.trim().to_uppercase();
            if store.remove(&symbol).context("failed to update watchlist")? {
                println!("Removed {symbol}");
            } else {
                println!("{symbol} is not in the watchlist");
            }
        }
        WatchlistAction::List => {
            let symbols = store.load().context("failed to load watchlist")?;
            if symbols.is_empty() {
                println!("Watchlist is empty.");
            }
            for symbol in &symbols {
                println!("{symbol}");
            }
        }
    }
    Ok(())
}

async fn cmd_search(cli: &Cli, query: &str, limit: usize) -> Result<()> {
    let provider = create_provider(&cli.api_url);
    let symbols = provider
        .fetch_exchange_symbols()
        .await
        .context("failed to fetch exchange symbols")?;

    let matches = filter_symbols(&symbols, query);
    for info in matches.iter().take(limit) {
        println!("{:<14} {}/{}", info.symbol, info.base_asset, info.quote_asset);
    }
    if matches.len() > limit {
        println!("... {} more", matches.len() - limit);
    }
    println!("{} match(es)", matches.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match &cli.command {
        Commands::Chart { chart, follow } => {
            cmd_chart(&cli, chart, *follow).await?;
        }
        Commands::Trendline { chart, from, to } => {
            cmd_trendline(&cli, chart, *from, *to).await?;
        }
        Commands::Watch {
            interval_secs,
            polls,
        } => {
            cmd_watch(&cli, *interval_secs, *polls).await?;
        }
        Commands::Watchlist { action } => {
            let store = WatchlistStore::new(&cli.data_dir);
            cmd_watchlist(&store, action)?;
        }
        Commands::Search { query, limit } => {
            cmd_search(&cli, query, *limit).await?;
        }
    }

    Ok(())
}
