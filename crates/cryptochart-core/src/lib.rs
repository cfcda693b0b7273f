pub mod candle;
pub mod config;
pub mod delta;
pub mod error;
pub mod merge;
pub mod normalize;
pub mod session;
pub mod store;
pub mod symbol;
pub mod timeframe;
pub mod trendline;
pub mod viewport;
