use std::path::{Path, PathBuf};

use crate::error::ChartError;

/// Symbols a fresh install starts with.
pub const DEFAULT_WATCHLIST: [&str; 3] = ["BTCUSDT", "ETHUSDT", "BNBUSDT"];

/// Filesystem-backed watchlist persistence.
///
/// Layout: `{root}/watchlist.json`, a JSON array of symbol identifiers.
pub struct WatchlistStore {
    path: PathBuf,
}

impl WatchlistStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join("watchlist.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved watchlist, or the default list if nothing was saved yet.
    pub fn load(&self) -> Result<Vec<String>, ChartError> {
        if !self.path.exists() {
            return Ok(DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save the watchlist. Creates parent directories as needed.
    pub fn save(&self, symbols: &[String]) -> Result<(), ChartError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(symbols)?)?;
        Ok(())
    }

    /// Append a symbol if not present. Returns whether the list changed.
    pub fn add(&self, symbol: &str) -> Result<bool, ChartError> {
        let mut symbols = self.load()?;
        if symbols.iter().any(|s| s == symbol) {
            return Ok(false);
        }
        symbols.push(symbol.to_string());
        self.save(&symbols)?;
        Ok(true)
    }

    /// Remove a symbol. Returns whether the list changed.
    pub fn remove(&self, symbol: &str) -> Result<bool, ChartError> {
        let mut symbols = self.load()?;
        let before = symbols.len();
        symbols.retain(|s| s != symbol);
        if symbols.len() == before {
            return Ok(false);
        }
        self.save(&symbols)?;
        Ok(true)
    }
}
