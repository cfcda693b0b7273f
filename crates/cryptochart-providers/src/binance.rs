use std::collections::HashMap;

use async_trait::async_trait;
use cryptochart_core::symbol::SymbolInfo;
use cryptochart_core::timeframe::Timeframe;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::ExchangeProvider;

pub const BINANCE_API_BASE_URL: &str = "https://api.binance.com/api/v3";

/// Binance spot REST provider. Public endpoints only, no authentication.
pub struct BinanceProvider {
    client: Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_API_BASE_URL.to_string())
    }

    /// Create with a custom base URL (for testing or a regional mirror).
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {url}");
        let response = self.client.get(&url).query(query).send().await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("failed to parse {path} response: {e}")))
    }
}

impl Default for BinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(ProviderError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    Ok(response)
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeSymbol {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
}

/// Keep prices for the requested symbols. Unparsable prices are skipped so the
/// watchlist treats them as missing rather than zero.
fn prices_for(tickers: Vec<TickerPrice>, symbols: &[String]) -> HashMap<String, f64> {
    tickers
        .into_iter()
        .filter(|t| symbols.contains(&t.symbol))
        .filter_map(|t| {
            let price = t.price.trim().parse::<f64>().ok().filter(|p| p.is_finite())?;
            Some((t.symbol, price))
        })
        .collect()
}

fn trading_symbols(info: ExchangeInfo) -> Vec<SymbolInfo> {
    info.symbols
        .into_iter()
        .filter(|s| s.status == "TRADING")
        .map(|s| SymbolInfo {
            symbol: s.symbol,
            base_asset: s.base_asset,
            quote_asset: s.quote_asset,
        })
        .collect()
}

#[async_trait]
impl ExchangeProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch_ticker_prices(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, f64>, ProviderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let tickers: Vec<TickerPrice> = self.get_json("ticker/price", &[]).await?;
        Ok(prices_for(tickers, symbols))
    }

    async fn fetch_exchange_symbols(&self) -> Result<Vec<SymbolInfo>, ProviderError> {
        let info: ExchangeInfo = self.get_json("exchangeInfo", &[]).await?;
        Ok(trading_symbols(info))
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Value>, ProviderError> {
        if symbol.trim().is_empty() {
            return Err(ProviderError::Config("symbol must not be empty".into()));
        }
        self.get_json(
            "klines",
            &[
                ("symbol", symbol.to_uppercase()),
                ("interval", timeframe.interval().to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }
}
