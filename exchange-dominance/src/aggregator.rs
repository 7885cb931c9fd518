use crate::{
    dataset::{Candle, HistoricalDataset},
    exchange::{
        MarketClient, MarketSymbol, ProductType, VenueId, Venues, catalog::ExchangeCatalog,
    },
    ledger::{ErrorLedger, Operation},
    normalise::VolumeNormaliser,
    retry::{ResilientOperation, RetryPolicy},
};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

/// Orchestrates the sequential per-venue daily bar fetches of one asset into a
/// [`HistoricalDataset`].
#[derive(Debug, Clone, Copy)]
pub struct HistoricalAggregator<'a> {
    catalog: &'a ExchangeCatalog,
    venues: &'a Venues,
    normaliser: VolumeNormaliser,
    policy: &'a RetryPolicy,
}

impl<'a> HistoricalAggregator<'a> {
    pub fn new(
        catalog: &'a ExchangeCatalog,
        venues: &'a Venues,
        normaliser: VolumeNormaliser,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            venues,
            normaliser,
            policy,
        }
    }

    /// Fetch the `days - 1` most recent completed daily bars of `ticker` from every venue, in
    /// catalog priority order, spot before perpetual.
    ///
    /// Bars dated `today` or later are still in progress and always excluded. Venues that fail,
    /// do not list the asset, or return no bars contribute nothing.
    pub async fn aggregate(
        &self,
        ticker: &str,
        days: u32,
        today: NaiveDate,
        ledger: &mut ErrorLedger,
    ) -> HistoricalDataset {
        let mut candles = Vec::new();

        for (exchange, symbols) in self.catalog.symbols_for(ticker) {
            for product in [ProductType::Spot, ProductType::Perpetual] {
                let Some(symbol) = symbols.get(product) else {
                    continue;
                };

                let venue = VenueId::new(exchange, product);
                let Some(client) = self.venues.get(&venue) else {
                    debug!(exchange = %venue, "no client configured");
                    continue;
                };

                let fetched = self
                    .fetch_venue(client, venue, symbol, days, today, ledger)
                    .await;

                info!(exchange = %venue, %symbol, candles = fetched.len(), "fetched daily bars");
                candles.extend(fetched);
            }
        }

        HistoricalDataset::new(candles)
    }

    async fn fetch_venue(
        &self,
        client: &Arc<dyn MarketClient>,
        venue: VenueId,
        symbol: &MarketSymbol,
        days: u32,
        today: NaiveDate,
        ledger: &mut ErrorLedger,
    ) -> Vec<Candle> {
        let Some(markets) = ResilientOperation::new(self.policy, venue, Operation::LoadMarkets)
            .run(ledger, move || client.load_markets())
            .await
        else {
            return Vec::new();
        };

        if !markets.contains(symbol) {
            debug!(exchange = %venue, %symbol, "symbol not listed");
            return Vec::new();
        }

        let limit = days as usize;
        let Some(bars) = ResilientOperation::new(self.policy, venue, Operation::FetchOhlcv)
            .run(ledger, move || client.fetch_daily_bars(symbol, limit))
            .await
        else {
            return Vec::new();
        };

        let completed = bars
            .iter()
            .filter(|bar| bar.open_time.date_naive() < today)
            .collect::<Vec<_>>();
        let skip = completed.len().saturating_sub(limit.saturating_sub(1));

        completed[skip..]
            .iter()
            .filter_map(|bar| self.normaliser.candle(venue, symbol, bar))
            .collect()
    }
}
