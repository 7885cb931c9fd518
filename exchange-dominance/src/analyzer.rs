use crate::{
    aggregator::HistoricalAggregator,
    config::AnalyzerConfig,
    dataset::HistoricalDataset,
    error::AnalyzerError,
    exchange::{
        ExchangeId, MarketClient, MarketSymbol, ProductType, Venues, catalog::ExchangeCatalog,
        rest::RestClient,
    },
    fallback::FallbackSource,
    ledger::{ErrorLedger, ErrorSummary, MissingExchange},
    normalise::VolumeNormaliser,
    retry::RetryPolicy,
    share::{self, AggregationMode, MarketShareRow},
    snapshot::{SnapshotFetcher, VolumeSnapshot},
};
use chrono::{NaiveDate, Utc};
use fnv::FnvHashSet;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::info;

/// Smallest accepted `days` argument. One completed bar per venue.
pub const MIN_DAYS: u32 = 2;

/// Largest accepted `days` argument.
pub const MAX_DAYS: u32 = 365;

/// Session scoped entry point of the volume & market share pipeline.
///
/// Every upstream call is made sequentially, exchanges in catalog priority order, and its
/// terminal outcome is recorded in the session [`ErrorLedger`]. Upstream failures never
/// propagate: the affected venue is simply absent from the result. Call
/// [`clear_session`](Self::clear_session) before starting an unrelated analysis.
///
/// ```rust,no_run
/// use exchange_dominance::{AnalyzerConfig, VolumeAnalyzer};
///
/// # async fn run() -> Result<(), exchange_dominance::error::AnalyzerError> {
/// let mut analyzer = VolumeAnalyzer::new(AnalyzerConfig::from_env())?;
///
/// let dataset = analyzer.fetch_historical("SOL", 30).await?;
/// for row in analyzer.daily_market_share(&dataset) {
///     println!("{} {} {:.2}%", row.date, row.key, row.share_pct);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct VolumeAnalyzer {
    catalog: ExchangeCatalog,
    venues: Venues,
    fallback: Option<FallbackSource>,
    normaliser: VolumeNormaliser,
    policy: RetryPolicy,
    ledger: ErrorLedger,
}

impl VolumeAnalyzer {
    /// Construct a [`VolumeAnalyzer`] over the default [`ExchangeCatalog`], with a
    /// [`RestClient`] for every venue of every exchange and the public [`FallbackSource`].
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let catalog = ExchangeCatalog::default();

        let mut venues = Venues::default();
        for exchange in catalog.iter() {
            for product in [ProductType::Spot, ProductType::Perpetual] {
                if exchange.template(product).is_none() {
                    continue;
                }
                if let Some(client) = RestClient::new(exchange, product)? {
                    venues.insert(Arc::new(client) as Arc<dyn MarketClient>);
                }
            }
        }

        let fallback = FallbackSource::public(config.fallback_timeout)?;

        info!(
            venues = venues.len(),
            constrained_network = config.constrained_network,
            "initialised volume analyzer"
        );

        Ok(Self::with_venues(catalog, venues, Some(fallback), &config))
    }

    /// Construct a [`VolumeAnalyzer`] from the process environment. See [`AnalyzerConfig::from_env`].
    pub fn from_env() -> Result<Self, AnalyzerError> {
        Self::new(AnalyzerConfig::from_env())
    }

    /// Construct a [`VolumeAnalyzer`] over explicit clients, eg/ in-memory venues for tests.
    pub fn with_venues(
        catalog: ExchangeCatalog,
        venues: Venues,
        fallback: Option<FallbackSource>,
        config: &AnalyzerConfig,
    ) -> Self {
        Self {
            catalog,
            venues,
            fallback,
            normaliser: VolumeNormaliser::new(config.krw_per_usd),
            policy: config.retry_policy(),
            ledger: ErrorLedger::default(),
        }
    }

    /// Replace the [`RetryPolicy`] derived from the [`AnalyzerConfig`].
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &ExchangeCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Daily USD volume of `ticker` on every venue over the `days - 1` most recent completed
    /// UTC days.
    pub async fn fetch_historical(
        &mut self,
        ticker: &str,
        days: u32,
    ) -> Result<HistoricalDataset, AnalyzerError> {
        self.fetch_historical_until(ticker, days, Utc::now().date_naive())
            .await
    }

    /// As [`fetch_historical`](Self::fetch_historical), treating `today` as the in-progress day.
    pub async fn fetch_historical_until(
        &mut self,
        ticker: &str,
        days: u32,
        today: NaiveDate,
    ) -> Result<HistoricalDataset, AnalyzerError> {
        if !(MIN_DAYS..=MAX_DAYS).contains(&days) {
            return Err(AnalyzerError::InvalidDays {
                days,
                min: MIN_DAYS,
                max: MAX_DAYS,
            });
        }

        info!(%ticker, days, %today, "fetching historical volume");

        let dataset = HistoricalAggregator::new(
            &self.catalog,
            &self.venues,
            self.normaliser,
            &self.policy,
        )
        .aggregate(ticker, days, today, &mut self.ledger)
        .await;

        info!(
            %ticker,
            candles = dataset.len(),
            venues = dataset.venues().len(),
            "historical volume fetched"
        );

        Ok(dataset)
    }

    /// [`SnapshotFetcher`] over this session's clients, alongside the session ledger.
    fn snapshot(&mut self) -> (SnapshotFetcher<'_>, &mut ErrorLedger) {
        let fetcher = SnapshotFetcher::new(
            &self.catalog,
            &self.venues,
            self.fallback.as_ref(),
            self.normaliser,
            &self.policy,
        );
        (fetcher, &mut self.ledger)
    }

    /// Average last trade price of `ticker` in USD, 0 when no price source answers.
    pub async fn current_price(&mut self, ticker: &str) -> f64 {
        let (fetcher, ledger) = self.snapshot();
        fetcher.current_price(ticker, ledger).await
    }

    /// Spot pairs of `ticker` listed per exchange.
    pub async fn supported_symbols(&mut self, ticker: &str) -> IndexMap<ExchangeId, Vec<MarketSymbol>> {
        let (fetcher, ledger) = self.snapshot();
        fetcher.supported_symbols(ticker, ledger).await
    }

    /// Rolling 24h USD volume of `ticker` per exchange, spot pairs & perpetual.
    pub async fn fetch_24h_volume(&mut self, ticker: &str) -> VolumeSnapshot {
        info!(%ticker, "fetching 24h volume");
        let (fetcher, ledger) = self.snapshot();
        fetcher.fetch_24h_volume(ticker, ledger).await
    }

    pub fn daily_market_share(&self, dataset: &HistoricalDataset) -> Vec<MarketShareRow> {
        share::daily_market_share(dataset)
    }

    pub fn market_share_by_mode(
        &self,
        dataset: &HistoricalDataset,
        mode: AggregationMode,
    ) -> Vec<MarketShareRow> {
        share::market_share_by_mode(dataset, mode)
    }

    pub fn error_summary(&self) -> ErrorSummary {
        self.ledger.summarize()
    }

    /// Catalog exchanges absent from `dataset`, with the most recent ledgered failure of each.
    pub fn missing_exchanges(&self, dataset: &HistoricalDataset) -> Vec<MissingExchange> {
        let present = dataset.exchanges().into_iter().collect::<FnvHashSet<_>>();
        self.ledger.missing_exchanges(
            self.catalog.iter().map(|config| config.id),
            &present,
        )
    }

    /// Reset the session [`ErrorLedger`].
    pub fn clear_session(&mut self) {
        self.ledger.clear();
    }
}
