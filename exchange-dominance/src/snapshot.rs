use crate::{
    exchange::{
        ExchangeId, MarketClient, MarketSymbol, ProductType, TickerReading, VenueId, Venues,
        catalog::{ExchangeCatalog, ExchangeConfig, normalise_ticker},
    },
    fallback::FallbackSource,
    ledger::{ErrorLedger, Operation},
    normalise::{QuoteClass, VolumeNormaliser},
    retry::{Attempt, ResilientOperation, RetryPolicy},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// 24h USD volume of a single market.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PairVolume {
    pub venue: VenueId,
    pub symbol: MarketSymbol,
    pub last_price: f64,
    pub volume_usd: f64,
    /// Reading was served by the fallback endpoint.
    pub via_fallback: bool,
}

/// 24h USD volume of one exchange, spot & perpetual.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExchangeVolume {
    pub exchange: ExchangeId,
    pub spot_volume_usd: f64,
    pub perpetual_volume_usd: f64,
    pub pairs: Vec<PairVolume>,
}

impl ExchangeVolume {
    fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            spot_volume_usd: 0.0,
            perpetual_volume_usd: 0.0,
            pairs: Vec::new(),
        }
    }

    fn push(&mut self, pair: PairVolume) {
        match pair.venue.product {
            ProductType::Spot => self.spot_volume_usd += pair.volume_usd,
            ProductType::Perpetual => self.perpetual_volume_usd += pair.volume_usd,
        }
        self.pairs.push(pair);
    }

    pub fn total_volume_usd(&self) -> f64 {
        self.spot_volume_usd + self.perpetual_volume_usd
    }
}

/// Rolling 24h volume of one asset across every responding exchange.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VolumeSnapshot {
    pub exchanges: Vec<ExchangeVolume>,
    pub fetched_at: DateTime<Utc>,
}

impl VolumeSnapshot {
    pub fn total_volume_usd(&self) -> f64 {
        self.exchanges.iter().map(ExchangeVolume::total_volume_usd).sum()
    }

    /// Share of `exchange` in the total volume, 0 when absent or when the total is 0.
    pub fn share_pct(&self, exchange: ExchangeId) -> f64 {
        let total = self.total_volume_usd();
        if total <= 0.0 {
            return 0.0;
        }

        self.exchanges
            .iter()
            .find(|volume| volume.exchange == exchange)
            .map_or(0.0, |volume| volume.total_volume_usd() / total * 100.0)
    }

    /// Exchange with the largest total volume.
    pub fn top_exchange(&self) -> Option<&ExchangeVolume> {
        self.exchanges
            .iter()
            .max_by(|a, b| a.total_volume_usd().total_cmp(&b.total_volume_usd()))
    }

    /// Combined share of the KRW settling exchanges.
    pub fn krw_share_pct(&self) -> f64 {
        self.exchanges
            .iter()
            .filter(|volume| volume.exchange.is_krw_exchange())
            .map(|volume| self.share_pct(volume.exchange))
            .sum()
    }
}

/// Snapshot operations: 24h volume, current price and listed pairs.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFetcher<'a> {
    catalog: &'a ExchangeCatalog,
    venues: &'a Venues,
    fallback: Option<&'a FallbackSource>,
    normaliser: VolumeNormaliser,
    policy: &'a RetryPolicy,
}

impl<'a> SnapshotFetcher<'a> {
    pub fn new(
        catalog: &'a ExchangeCatalog,
        venues: &'a Venues,
        fallback: Option<&'a FallbackSource>,
        normaliser: VolumeNormaliser,
        policy: &'a RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            venues,
            fallback,
            normaliser,
            policy,
        }
    }

    async fn load_markets(
        &self,
        client: &Arc<dyn MarketClient>,
        ledger: &mut ErrorLedger,
    ) -> Option<Vec<MarketSymbol>> {
        ResilientOperation::new(self.policy, client.venue(), Operation::LoadMarkets)
            .run(ledger, move || client.load_markets())
            .await
    }

    async fn fetch_ticker(
        &self,
        client: &Arc<dyn MarketClient>,
        symbol: &MarketSymbol,
        ledger: &mut ErrorLedger,
    ) -> Option<TickerReading> {
        ResilientOperation::new(self.policy, client.venue(), Operation::FetchTicker)
            .run(ledger, move || client.fetch_ticker(symbol))
            .await
    }

    /// Every spot pair listed per exchange whose base asset is `ticker`.
    pub async fn supported_symbols(
        &self,
        ticker: &str,
        ledger: &mut ErrorLedger,
    ) -> IndexMap<ExchangeId, Vec<MarketSymbol>> {
        let Some(base) = normalise_ticker(ticker) else {
            return IndexMap::new();
        };

        let mut supported = IndexMap::new();
        for config in self.catalog.iter() {
            let Some(client) = self.venues.get(&VenueId::spot(config.id)) else {
                continue;
            };
            let Some(markets) = self.load_markets(client, ledger).await else {
                continue;
            };

            let symbols = markets
                .into_iter()
                .filter(|symbol| symbol.base == base.as_str())
                .collect::<Vec<_>>();

            if !symbols.is_empty() {
                debug!(exchange = %config.id, pairs = symbols.len(), "supported symbols");
                supported.insert(config.id, symbols);
            }
        }

        supported
    }

    /// Average last trade price across the reliable price sources, or 0 when none answers.
    pub async fn current_price(&self, ticker: &str, ledger: &mut ErrorLedger) -> f64 {
        let Some(base) = normalise_ticker(ticker) else {
            return 0.0;
        };

        let mut prices = Vec::new();
        for config in self.catalog.price_sources() {
            let (Some(template), Some(client)) =
                (config.spot, self.venues.get(&VenueId::spot(config.id)))
            else {
                continue;
            };

            let symbol = template.render(&base);
            let price = self
                .fetch_ticker(client, &symbol, ledger)
                .await
                .map(|reading| reading.last_price)
                .filter(|price| price.is_finite() && *price > 0.0);

            prices.extend(price);
        }

        if prices.is_empty() {
            return 0.0;
        }

        prices.iter().sum::<f64>() / prices.len() as f64
    }

    /// 24h USD volume of `ticker` on every exchange, spot pairs and the perpetual contract.
    pub async fn fetch_24h_volume(&self, ticker: &str, ledger: &mut ErrorLedger) -> VolumeSnapshot {
        let mut exchanges = Vec::new();

        for (exchange, symbols) in self.catalog.symbols_for(ticker) {
            let Some(config) = self.catalog.get(exchange) else {
                continue;
            };

            let mut volume = ExchangeVolume::new(exchange);

            if let Some(template) = &symbols.spot {
                for pair in self.spot_volumes(config, template, ledger).await {
                    volume.push(pair);
                }
            }

            if let Some(symbol) = &symbols.perpetual {
                if let Some(pair) = self.perpetual_volume(config, symbol, ledger).await {
                    volume.push(pair);
                }
            }

            if volume.total_volume_usd() > 0.0 {
                info!(
                    %exchange,
                    spot = volume.spot_volume_usd,
                    perpetual = volume.perpetual_volume_usd,
                    "fetched 24h volume"
                );
                exchanges.push(volume);
            }
        }

        VolumeSnapshot {
            exchanges,
            fetched_at: Utc::now(),
        }
    }

    async fn spot_volumes(
        &self,
        config: &ExchangeConfig,
        template: &MarketSymbol,
        ledger: &mut ErrorLedger,
    ) -> Vec<PairVolume> {
        let venue = VenueId::spot(config.id);
        let Some(client) = self.venues.get(&venue) else {
            return Vec::new();
        };

        let candidates = match self.load_markets(client, ledger).await {
            Some(markets) => markets
                .into_iter()
                .filter(|symbol| {
                    symbol.base == template.base
                        && QuoteClass::of(&symbol.quote) != QuoteClass::Unsupported
                })
                .collect::<Vec<_>>(),
            // Market list unavailable: only the templated pair can reach the fallback
            None if config.fallback.is_some() => vec![template.clone()],
            None => Vec::new(),
        };

        let mut pairs = Vec::new();
        for symbol in candidates {
            let primary = ResilientOperation::new(self.policy, venue, Operation::FetchTicker)
                .attempt(ledger, || client.fetch_ticker(&symbol))
                .await;

            let (reading, via_fallback) = match (primary, self.fallback) {
                (Attempt::Completed(reading), _) => (reading, false),
                (Attempt::Failed(_), Some(fallback)) if symbol == *template => {
                    match fallback.fetch_ticker(config, &symbol, ledger).await {
                        Some(reading) => (reading, true),
                        None => continue,
                    }
                }
                _ => continue,
            };

            if let Some(volume_usd) = self.normaliser.ticker_usd_volume(&symbol, &reading) {
                pairs.push(PairVolume {
                    venue,
                    symbol,
                    last_price: reading.last_price,
                    volume_usd,
                    via_fallback,
                });
            }
        }

        pairs
    }

    async fn perpetual_volume(
        &self,
        config: &ExchangeConfig,
        symbol: &MarketSymbol,
        ledger: &mut ErrorLedger,
    ) -> Option<PairVolume> {
        let venue = VenueId::perpetual(config.id);
        let client = self.venues.get(&venue)?;

        let markets = self.load_markets(client, ledger).await?;
        if !markets.contains(symbol) {
            debug!(exchange = %venue, %symbol, "perpetual not listed");
            return None;
        }

        let reading = self.fetch_ticker(client, symbol, ledger).await?;
        let volume_usd = self.normaliser.ticker_usd_volume(symbol, &reading)?;

        Some(PairVolume {
            venue,
            symbol: symbol.clone(),
            last_price: reading.last_price,
            volume_usd,
            via_fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange_volume(exchange: ExchangeId, spot: f64, perpetual: f64) -> ExchangeVolume {
        ExchangeVolume {
            exchange,
            spot_volume_usd: spot,
            perpetual_volume_usd: perpetual,
            pairs: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_shares() {
        let snapshot = VolumeSnapshot {
            exchanges: vec![
                exchange_volume(ExchangeId::Binance, 100.0, 300.0),
                exchange_volume(ExchangeId::Upbit, 50.0, 0.0),
                exchange_volume(ExchangeId::Bithumb, 50.0, 0.0),
            ],
            fetched_at: Utc::now(),
        };

        assert_eq!(snapshot.total_volume_usd(), 500.0);
        assert_eq!(snapshot.share_pct(ExchangeId::Binance), 80.0);
        assert_eq!(snapshot.share_pct(ExchangeId::Kraken), 0.0);
        assert_eq!(snapshot.krw_share_pct(), 20.0);
        assert_eq!(
            snapshot.top_exchange().map(|volume| volume.exchange),
            Some(ExchangeId::Binance)
        );
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = VolumeSnapshot {
            exchanges: Vec::new(),
            fetched_at: Utc::now(),
        };

        assert_eq!(snapshot.total_volume_usd(), 0.0);
        assert_eq!(snapshot.share_pct(ExchangeId::Binance), 0.0);
        assert!(snapshot.top_exchange().is_none());
    }
}
