use std::collections::HashMap;

use async_trait::async_trait;
use cryptochart_core::symbol::SymbolInfo;
use cryptochart_core::timeframe::Timeframe;
use serde_json::Value;

use crate::error::ProviderError;

/// One-shot REST access to an exchange's market data.
#[async_trait]
pub trait ExchangeProvider: Send + Sync {
    /// Provider name (for logging/display).
    fn name(&self) -> &str;

    /// Latest price for each requested symbol. Symbols the exchange does not
    /// quote are absent from the map.
    async fn fetch_ticker_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, f64>, ProviderError>;

    /// All currently tradable symbols.
    async fn fetch_exchange_symbols(&self) -> Result<Vec<SymbolInfo>, ProviderError>;

    /// Up to `limit` most recent raw kline records, oldest first.
    /// Records are passed through unvalidated for the normalizer.
    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Value>, ProviderError>;
}
