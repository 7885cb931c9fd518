#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use exchange_dominance::{
    AnalyzerConfig, VolumeAnalyzer,
    error::ApiError,
    exchange::{
        MarketClient, MarketSymbol, RawBar, TickerReading, VenueId, Venues,
        catalog::ExchangeCatalog,
    },
    fallback::{FallbackSource, FallbackTransport},
    retry::RetryPolicy,
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use url::Url;

/// Scripted in-memory [`MarketClient`].
///
/// Each operation pops the next scripted response. Once the script is exhausted, markets keep
/// answering with the listed symbols and every other operation fails as malformed.
#[derive(Debug)]
pub struct MockClient {
    venue: VenueId,
    markets: Vec<MarketSymbol>,
    market_script: Mutex<VecDeque<Result<Vec<MarketSymbol>, ApiError>>>,
    bar_script: Mutex<VecDeque<Result<Vec<RawBar>, ApiError>>>,
    ticker_script: Mutex<FnvHashMap<MarketSymbol, VecDeque<Result<TickerReading, ApiError>>>>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LoadMarkets,
    FetchTicker(MarketSymbol),
    FetchDailyBars { symbol: MarketSymbol, limit: usize },
}

impl MockClient {
    pub fn new(venue: &str) -> Self {
        Self {
            venue: venue.parse().unwrap(),
            markets: Vec::new(),
            market_script: Mutex::new(VecDeque::new()),
            bar_script: Mutex::new(VecDeque::new()),
            ticker_script: Mutex::new(FnvHashMap::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn listing(mut self, symbols: &[&str]) -> Self {
        self.markets = symbols.iter().map(|symbol| symbol.parse().unwrap()).collect();
        self
    }

    pub fn markets_result(self, result: Result<Vec<MarketSymbol>, ApiError>) -> Self {
        self.market_script.lock().push_back(result);
        self
    }

    pub fn bars_result(self, result: Result<Vec<RawBar>, ApiError>) -> Self {
        self.bar_script.lock().push_back(result);
        self
    }

    pub fn bars(self, bars: Vec<RawBar>) -> Self {
        self.bars_result(Ok(bars))
    }

    pub fn ticker_result(self, symbol: &str, result: Result<TickerReading, ApiError>) -> Self {
        self.ticker_script
            .lock()
            .entry(symbol.parse().unwrap())
            .or_default()
            .push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| call(c)).count()
    }
}

fn unscripted(operation: &str) -> ApiError {
    ApiError::Malformed(format!("{operation} not scripted"))
}

#[async_trait]
impl MarketClient for MockClient {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn load_markets(&self) -> Result<Vec<MarketSymbol>, ApiError> {
        self.calls.lock().push(Call::LoadMarkets);
        self.market_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.markets.clone()))
    }

    async fn fetch_ticker(&self, symbol: &MarketSymbol) -> Result<TickerReading, ApiError> {
        self.calls.lock().push(Call::FetchTicker(symbol.clone()));
        self.ticker_script
            .lock()
            .get_mut(symbol)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(unscripted("ticker")))
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &MarketSymbol,
        limit: usize,
    ) -> Result<Vec<RawBar>, ApiError> {
        self.calls.lock().push(Call::FetchDailyBars {
            symbol: symbol.clone(),
            limit,
        });

        let mut bars = self
            .bar_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("bars")))?;

        let skip = bars.len().saturating_sub(limit);
        Ok(bars.split_off(skip))
    }
}

/// Fallback transport answering by URL host. Unknown hosts are unreachable.
#[derive(Debug, Default)]
pub struct CannedFallback {
    responses: Vec<(&'static str, Result<String, ApiError>)>,
    pub requested: Mutex<Vec<Url>>,
}

impl CannedFallback {
    pub fn respond(mut self, host: &'static str, response: Result<&str, ApiError>) -> Self {
        self.responses
            .push((host, response.map(str::to_string)));
        self
    }
}

#[async_trait]
impl FallbackTransport for CannedFallback {
    async fn get(&self, url: Url) -> Result<String, ApiError> {
        self.requested.lock().push(url.clone());
        self.responses
            .iter()
            .find(|(host, _)| url.host_str() == Some(*host))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Err(ApiError::Network("host unreachable".to_string())))
    }
}

pub fn date(input: &str) -> NaiveDate {
    input.parse().unwrap()
}

/// Daily bar opening at midnight UTC of `day` with a flat price.
pub fn bar(day: &str, volume: f64, close: f64) -> RawBar {
    let open_time = date(day).and_time(NaiveTime::MIN).and_utc();
    RawBar::new(open_time, close, close, close, close, volume)
}

pub fn timeout() -> ApiError {
    ApiError::Timeout("operation timed out after 10s".to_string())
}

/// [`VolumeAnalyzer`] over the default catalog and only the provided clients, never sleeping
/// between attempts.
pub fn analyzer(clients: &[Arc<MockClient>], fallback: Option<Arc<CannedFallback>>) -> VolumeAnalyzer {
    let venues = clients
        .iter()
        .map(|client| Arc::clone(client) as Arc<dyn MarketClient>)
        .collect::<Venues>();

    let fallback = fallback.map(|transport| FallbackSource::new(transport));

    VolumeAnalyzer::with_venues(
        ExchangeCatalog::default(),
        venues,
        fallback,
        &AnalyzerConfig::default(),
    )
    .with_retry_policy(RetryPolicy::immediate(3))
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_test_writer()
        .try_init();
}
