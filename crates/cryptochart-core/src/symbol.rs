use serde::{Deserialize, Serialize};

/// A tradable pair as listed by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

impl SymbolInfo {
    fn matches(&self, needle: &str) -> bool {
        [&self.symbol, &self.base_asset, &self.quote_asset]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Case-insensitive substring search over symbol, base and quote asset.
/// An empty query returns every symbol.
pub fn filter_symbols<'a>(symbols: &'a [SymbolInfo], query: &str) -> Vec<&'a SymbolInfo> {
    let needle = query.trim().to_lowercase();
    symbols
        .iter()
        .filter(|info| needle.is_empty() || info.matches(&needle))
        .collect()
}
