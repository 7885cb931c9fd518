use super::{
    ExchangeId, MarketClient, MarketSymbol, ProductType, RawBar, TickerReading, VenueId,
    binance::{BinanceFuturesUsd, BinanceSpot},
    bybit::Bybit,
    catalog::ExchangeConfig,
    coinbase::Coinbase,
    kraken::Kraken,
    kucoin::{KucoinFutures, KucoinSpot},
    okx::Okx,
    upbit::UpbitCompatible,
};
use crate::error::{AnalyzerError, ApiError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Path & query of a single GET request against a venue's `base_url`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RestRequest {
    pub path: String,
    pub query: Vec<(&'static str, String)>,
}

impl RestRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }
}

/// Exchange specific request building & response parsing for one venue.
///
/// Every venue implements the same capability; the adapter is selected from the [`VenueId`] by
/// [`venue_api`].
pub trait VenueApi: Send + Sync + Debug {
    fn base_url(&self) -> &'static str;

    fn markets_request(&self) -> RestRequest;

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError>;

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest;

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError>;

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest;

    /// Parse daily bars, sorted oldest first.
    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError>;
}

/// Select the [`VenueApi`] adapter of a venue, if the venue exists.
pub fn venue_api(venue: VenueId) -> Option<Box<dyn VenueApi>> {
    type E = ExchangeId;
    use ProductType::{Perpetual, Spot};

    let api: Box<dyn VenueApi> = match (venue.exchange, venue.product) {
        (E::Binance, Spot) => Box::new(BinanceSpot),
        (E::Binance, Perpetual) => Box::new(BinanceFuturesUsd),
        (E::Bybit, product) => Box::new(Bybit::new(product)),
        (E::Okx, product) => Box::new(Okx::new(product)),
        (E::Kucoin, Spot) => Box::new(KucoinSpot),
        (E::Kucoin, Perpetual) => Box::new(KucoinFutures),
        (E::Coinbase, Spot) => Box::new(Coinbase),
        (E::Kraken, Spot) => Box::new(Kraken),
        (E::Upbit, Spot) => Box::new(UpbitCompatible::upbit()),
        (E::Bithumb, Spot) => Box::new(UpbitCompatible::bithumb()),
        (E::Coinbase | E::Kraken | E::Upbit | E::Bithumb, Perpetual) => return None,
    };

    Some(api)
}

/// Build a `reqwest` client with the provided default headers & timeout, for the client
/// identified by `label`.
pub fn build_http_client(
    label: &str,
    timeout: Duration,
    headers: &[(&'static str, &'static str)],
) -> Result<reqwest::Client, AnalyzerError> {
    let http_error = |message: String| AnalyzerError::HttpClient {
        exchange: label.to_string(),
        message,
    };

    let mut header_map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|error| http_error(error.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|error| http_error(error.to_string()))?;
        header_map.insert(name, value);
    }

    reqwest::Client::builder()
        .default_headers(header_map)
        .timeout(timeout)
        .build()
        .map_err(|error| http_error(error.to_string()))
}

/// `reqwest` backed [`MarketClient`] for a single venue.
///
/// Requests are spaced by at least the exchange's `min_interval`, and the market list is cached
/// for the lifetime of the client.
#[derive(Debug)]
pub struct RestClient {
    venue: VenueId,
    http: reqwest::Client,
    api: Box<dyn VenueApi>,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    markets: RwLock<Option<Arc<Vec<MarketSymbol>>>>,
}

impl RestClient {
    /// Construct a [`RestClient`] for `product` on the exchange described by `config`.
    ///
    /// Returns `Ok(None)` if the exchange has no such venue.
    pub fn new(config: &ExchangeConfig, product: ProductType) -> Result<Option<Self>, AnalyzerError> {
        let venue = VenueId::new(config.id, product);

        let Some(api) = venue_api(venue) else {
            return Ok(None);
        };

        let http = build_http_client(&venue.to_string(), config.timeout, &config.headers)?;

        Ok(Some(Self {
            venue,
            http,
            api,
            min_interval: config.min_interval,
            next_slot: Mutex::new(None),
            markets: RwLock::new(None),
        }))
    }

    /// Wait until the next request slot of this venue is free, then reserve the following one.
    async fn throttle(&self) {
        let wait = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let slot = next_slot.map_or(now, |slot| slot.max(now));
            *next_slot = Some(slot + self.min_interval);
            slot - now
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn get(&self, request: RestRequest) -> Result<String, ApiError> {
        let url = format!("{}{}", self.api.base_url(), request.path);

        self.throttle().await;
        debug!(exchange = %self.venue, %url, query = ?request.query, "sending request");

        let response = self.http.get(&url).query(&request.query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &body));
        }

        Ok(body)
    }
}

#[async_trait]
impl MarketClient for RestClient {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn load_markets(&self) -> Result<Vec<MarketSymbol>, ApiError> {
        let cached = self.markets.read().clone();
        if let Some(markets) = cached {
            return Ok(markets.as_ref().clone());
        }

        let body = self.get(self.api.markets_request()).await?;
        let markets = Arc::new(self.api.parse_markets(&body)?);
        debug!(exchange = %self.venue, markets = markets.len(), "loaded markets");

        *self.markets.write() = Some(Arc::clone(&markets));
        Ok(markets.as_ref().clone())
    }

    async fn fetch_ticker(&self, symbol: &MarketSymbol) -> Result<TickerReading, ApiError> {
        let body = self.get(self.api.ticker_request(symbol)).await?;
        self.api.parse_ticker(&body)
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &MarketSymbol,
        limit: usize,
    ) -> Result<Vec<RawBar>, ApiError> {
        let body = self.get(self.api.bars_request(symbol, limit)).await?;
        let mut bars = self.api.parse_bars(&body)?;

        // Some venues ignore the requested limit
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }

        Ok(bars)
    }
}
