use crate::market_data::{MarketDataSource, Ticker};
use crate::storage_utils::UniverseConfig;
use std::collections::HashSet;
use tracing::info;

/// Decides which symbols take part in a batch scan.
#[derive(Debug, Clone, Default)]
pub struct UniverseFilter {
    /// Required symbol suffix, e.g. "USDT". Empty accepts everything.
    pub quote_asset: String,
    /// Delisted or anomalous symbols to leave out.
    pub excluded: HashSet<String>,
}

impl UniverseFilter {
    pub fn from_config(config: &UniverseConfig) -> Self {
        Self {
            quote_asset: config.quote_asset.clone(),
            excluded: config.excluded.iter().cloned().collect(),
        }
    }

    pub fn matches(&self, symbol: &str) -> bool {
        symbol.ends_with(&self.quote_asset) && !self.excluded.contains(symbol)
    }

    /// Applies the filter, keeping ticker order and dropping repeats.
    pub fn apply<'a, I>(&self, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        symbols
            .into_iter()
            .filter(|s| self.matches(s) && seen.insert(*s))
            .map(String::from)
            .collect()
    }
}

/// Lists tickers from `source` and filters them into the scan universe.
pub async fn load_universe<S>(source: &S, filter: &UniverseFilter) -> anyhow::Result<Vec<String>>
where
    S: MarketDataSource + ?Sized,
{
    let tickers: Vec<Ticker> = source.list_tickers().await?;
    let universe = filter.apply(tickers.iter().map(|t| t.symbol.as_str()));

    info!(
        tickers = tickers.len(),
        universe = universe.len(),
        quote = %filter.quote_asset,
        "universe loaded"
    );
    Ok(universe)
}
