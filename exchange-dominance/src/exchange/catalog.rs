use super::{ExchangeId, MarketSymbol, ProductType, VenueId};
use std::time::Duration;

/// Default request timeout applied to every venue.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifying `User-Agent` sent on the primary path.
pub const USER_AGENT: &str = concat!("exchange-dominance/", env!("CARGO_PKG_VERSION"));

/// Quote (and optional settle) currency substituted with a ticker to build a [`MarketSymbol`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SymbolTemplate {
    pub quote: &'static str,
    pub settle: Option<&'static str>,
}

impl SymbolTemplate {
    pub const fn spot(quote: &'static str) -> Self {
        Self {
            quote,
            settle: None,
        }
    }

    pub const fn perpetual(quote: &'static str, settle: &'static str) -> Self {
        Self {
            quote,
            settle: Some(settle),
        }
    }

    pub fn render(&self, base: &str) -> MarketSymbol {
        match self.settle {
            Some(settle) => MarketSymbol::perpetual(base, self.quote, settle),
            None => MarketSymbol::spot(base, self.quote),
        }
    }
}

/// Response shape of an alternate public ticker endpoint.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FallbackShape {
    /// Binance style 24hr ticker object.
    Binance24hr,
    /// Bybit v5 `result.list[]` envelope.
    BybitTickers,
    /// OKX v5 `data[]` envelope.
    OkxTicker,
    /// KuCoin `allTickers` snapshot, filtered client side.
    KucoinAllTickers,
}

/// Alternate public endpoint used by the [`FallbackSource`](crate::fallback) once the primary
/// path is exhausted.
///
/// `url` may contain the placeholders `{concat}` (eg/ `SOLUSDT`) and `{dashed}` (eg/ `SOL-USDT`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FallbackEndpoint {
    pub url: &'static str,
    pub shape: FallbackShape,
}

/// Immutable connection parameters & symbol templates of one known exchange.
#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    pub id: ExchangeId,
    pub timeout: Duration,
    /// Minimum spacing between two consecutive requests to this exchange.
    pub min_interval: Duration,
    pub headers: Vec<(&'static str, &'static str)>,
    pub spot: Option<SymbolTemplate>,
    pub perpetual: Option<SymbolTemplate>,
    pub fallback: Option<FallbackEndpoint>,
}

impl ExchangeConfig {
    fn new(id: ExchangeId, min_interval_ms: u64) -> Self {
        Self {
            id,
            timeout: DEFAULT_TIMEOUT,
            min_interval: Duration::from_millis(min_interval_ms),
            headers: vec![("User-Agent", USER_AGENT), ("Accept", "application/json")],
            spot: None,
            perpetual: None,
            fallback: None,
        }
    }

    fn with_spot(mut self, template: SymbolTemplate) -> Self {
        self.spot = Some(template);
        self
    }

    fn with_perpetual(mut self, template: SymbolTemplate) -> Self {
        self.perpetual = Some(template);
        self
    }

    fn with_fallback(mut self, url: &'static str, shape: FallbackShape) -> Self {
        self.fallback = Some(FallbackEndpoint { url, shape });
        self
    }

    pub fn template(&self, product: ProductType) -> Option<&SymbolTemplate> {
        match product {
            ProductType::Spot => self.spot.as_ref(),
            ProductType::Perpetual => self.perpetual.as_ref(),
        }
    }

    /// Every [`VenueId`] this exchange exposes, spot first.
    pub fn venues(&self) -> impl Iterator<Item = VenueId> + '_ {
        [ProductType::Spot, ProductType::Perpetual]
            .into_iter()
            .filter(|product| self.template(*product).is_some())
            .map(|product| VenueId::new(self.id, product))
    }
}

/// Symbols to query on one exchange for a requested asset.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct VenueSymbols {
    pub spot: Option<MarketSymbol>,
    pub perpetual: Option<MarketSymbol>,
}

impl VenueSymbols {
    pub fn get(&self, product: ProductType) -> Option<&MarketSymbol> {
        match product {
            ProductType::Spot => self.spot.as_ref(),
            ProductType::Perpetual => self.perpetual.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spot.is_none() && self.perpetual.is_none()
    }
}

/// Registry of every known [`ExchangeConfig`], iterated in priority order.
#[derive(Clone, Debug)]
pub struct ExchangeCatalog {
    exchanges: Vec<ExchangeConfig>,
}

impl ExchangeCatalog {
    pub fn new(exchanges: Vec<ExchangeConfig>) -> Self {
        Self { exchanges }
    }

    /// Exchanges in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter()
    }

    pub fn get(&self, id: ExchangeId) -> Option<&ExchangeConfig> {
        self.exchanges.iter().find(|config| config.id == id)
    }

    /// Exchanges whose last trade price feeds [`current_price`](crate::VolumeAnalyzer::current_price).
    pub fn price_sources(&self) -> impl Iterator<Item = &ExchangeConfig> {
        const RELIABLE: [ExchangeId; 4] = [
            ExchangeId::Binance,
            ExchangeId::Okx,
            ExchangeId::Bybit,
            ExchangeId::Coinbase,
        ];

        self.exchanges
            .iter()
            .filter(|config| RELIABLE.contains(&config.id))
            .filter(|config| {
                config
                    .spot
                    .is_some_and(|template| matches!(template.quote, "USD" | "USDT" | "USDC"))
            })
    }

    /// Build, for every exchange in priority order, the symbols to query for `ticker`.
    ///
    /// A malformed ticker yields an empty [`VenueSymbols`] for every exchange.
    pub fn symbols_for(&self, ticker: &str) -> Vec<(ExchangeId, VenueSymbols)> {
        let base = normalise_ticker(ticker);

        self.exchanges
            .iter()
            .map(|config| {
                let symbols = match &base {
                    Some(base) => VenueSymbols {
                        spot: config.spot.map(|template| template.render(base)),
                        perpetual: config.perpetual.map(|template| template.render(base)),
                    },
                    None => VenueSymbols::default(),
                };
                (config.id, symbols)
            })
            .collect()
    }
}

impl Default for ExchangeCatalog {
    fn default() -> Self {
        use ExchangeId::*;

        let usdt = SymbolTemplate::spot("USDT");
        let usdt_perp = SymbolTemplate::perpetual("USDT", "USDT");

        Self::new(vec![
            ExchangeConfig::new(Binance, 100)
                .with_spot(usdt)
                .with_perpetual(usdt_perp)
                .with_fallback(
                    "https://data-api.binance.vision/api/v3/ticker/24hr?symbol={concat}",
                    FallbackShape::Binance24hr,
                ),
            ExchangeConfig::new(Bybit, 100)
                .with_spot(usdt)
                .with_perpetual(usdt_perp)
                .with_fallback(
                    "https://api.bytick.com/v5/market/tickers?category=spot&symbol={concat}",
                    FallbackShape::BybitTickers,
                ),
            ExchangeConfig::new(Okx, 110)
                .with_spot(usdt)
                .with_perpetual(usdt_perp)
                .with_fallback(
                    "https://aws.okx.com/api/v5/market/ticker?instId={dashed}",
                    FallbackShape::OkxTicker,
                ),
            ExchangeConfig::new(Kucoin, 200)
                .with_spot(usdt)
                .with_perpetual(usdt_perp)
                .with_fallback(
                    "https://api.kucoin.com/api/v1/market/allTickers",
                    FallbackShape::KucoinAllTickers,
                ),
            ExchangeConfig::new(Coinbase, 350).with_spot(SymbolTemplate::spot("USD")),
            ExchangeConfig::new(Kraken, 1000).with_spot(usdt),
            ExchangeConfig::new(Upbit, 125).with_spot(SymbolTemplate::spot("KRW")),
            ExchangeConfig::new(Bithumb, 125).with_spot(SymbolTemplate::spot("KRW")),
        ])
    }
}

/// Trim & upper-case a ticker, rejecting anything that is not plain ASCII alphanumeric.
pub fn normalise_ticker(ticker: &str) -> Option<String> {
    let ticker = ticker.trim();

    if ticker.is_empty() || ticker.len() > 20 || !ticker.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ticker.to_ascii_uppercase())
}
