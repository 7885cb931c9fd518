use crate::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;

/// Static registry of known exchanges, their connection parameters and symbol templates.
pub mod catalog;

/// Serde helpers shared by the venue adapters.
pub mod de;

/// Generic `reqwest` backed [`MarketClient`] and the [`VenueApi`](rest::VenueApi) adapter seam.
pub mod rest;

/// Binance spot & USDⓈ-M futures adapters.
pub mod binance;

/// Bybit v5 spot & linear adapters.
pub mod bybit;

/// Coinbase Exchange spot adapter.
pub mod coinbase;

/// Kraken spot adapter.
pub mod kraken;

/// KuCoin spot & futures adapters.
pub mod kucoin;

/// OKX v5 spot & swap adapters.
pub mod okx;

/// Upbit compatible KRW adapter, shared by Upbit and Bithumb.
pub mod upbit;

/// Unique identifier of a known exchange.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    Binance,
    Bybit,
    Okx,
    Kucoin,
    Coinbase,
    Kraken,
    Upbit,
    Bithumb,
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 8] = [
        ExchangeId::Binance,
        ExchangeId::Bybit,
        ExchangeId::Okx,
        ExchangeId::Kucoin,
        ExchangeId::Coinbase,
        ExchangeId::Kraken,
        ExchangeId::Upbit,
        ExchangeId::Bithumb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Bybit => "bybit",
            ExchangeId::Okx => "okx",
            ExchangeId::Kucoin => "kucoin",
            ExchangeId::Coinbase => "coinbase",
            ExchangeId::Kraken => "kraken",
            ExchangeId::Upbit => "upbit",
            ExchangeId::Bithumb => "bithumb",
        }
    }

    /// Determine if this exchange settles in Korean won.
    pub fn is_krw_exchange(&self) -> bool {
        matches!(self, ExchangeId::Upbit | ExchangeId::Bithumb)
    }
}

impl FromStr for ExchangeId {
    type Err = VenueParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        ExchangeId::ALL
            .into_iter()
            .find(|exchange| exchange.as_str() == input)
            .ok_or_else(|| VenueParseError::UnknownExchange(input.to_string()))
    }
}

/// Traded product of a venue.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Display,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    #[display("spot")]
    Spot,
    #[display("perp")]
    Perpetual,
}

/// Suffix appended to an [`ExchangeId`] to identify its perpetual venue.
pub const PERPETUAL_SUFFIX: &str = "_perp";

/// Errors parsing exchange & venue identifiers.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum VenueParseError {
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("invalid market symbol: {0}")]
    InvalidSymbol(String),
}

/// A single (exchange, product) pair - the "exchange id" of every [`Candle`](crate::dataset::Candle).
///
/// Displays as `binance` for spot and `binance_perp` for the perpetual venue. The base exchange
/// is always held as a typed [`ExchangeId`], so spot+perp merging never relies on stripping
/// the suffix from a string.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Constructor, Deserialize, Serialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct VenueId {
    pub exchange: ExchangeId,
    pub product: ProductType,
}

impl VenueId {
    pub fn spot(exchange: ExchangeId) -> Self {
        Self::new(exchange, ProductType::Spot)
    }

    pub fn perpetual(exchange: ExchangeId) -> Self {
        Self::new(exchange, ProductType::Perpetual)
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.product {
            ProductType::Spot => f.pad(self.exchange.as_str()),
            ProductType::Perpetual => {
                f.pad(&format_smolstr!("{}{PERPETUAL_SUFFIX}", self.exchange.as_str()))
            }
        }
    }
}

impl FromStr for VenueId {
    type Err = VenueParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.strip_suffix(PERPETUAL_SUFFIX) {
            Some(base) => ExchangeId::from_str(base).map(VenueId::perpetual),
            None => ExchangeId::from_str(input).map(VenueId::spot),
        }
    }
}

impl From<VenueId> for String {
    fn from(venue: VenueId) -> Self {
        venue.to_string()
    }
}

impl TryFrom<String> for VenueId {
    type Error = VenueParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VenueId::from_str(&value)
    }
}

/// Exchange agnostic market symbol.
///
/// `BASE/QUOTE` for spot markets, `BASE/QUOTE:SETTLE` for perpetual contracts.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct MarketSymbol {
    pub base: SmolStr,
    pub quote: SmolStr,
    pub settle: Option<SmolStr>,
}

impl MarketSymbol {
    pub fn spot<S: AsRef<str>>(base: S, quote: S) -> Self {
        Self {
            base: SmolStr::new(base.as_ref().to_uppercase()),
            quote: SmolStr::new(quote.as_ref().to_uppercase()),
            settle: None,
        }
    }

    pub fn perpetual<S: AsRef<str>>(base: S, quote: S, settle: S) -> Self {
        Self {
            settle: Some(SmolStr::new(settle.as_ref().to_uppercase())),
            ..Self::spot(base, quote)
        }
    }

    pub fn product(&self) -> ProductType {
        match self.settle {
            Some(_) => ProductType::Perpetual,
            None => ProductType::Spot,
        }
    }

    /// Concatenated `BASEQUOTE` form used by Binance, Bybit and Kraken.
    pub fn concat(&self) -> SmolStr {
        format_smolstr!("{}{}", self.base, self.quote)
    }

    /// Dash separated `BASE-QUOTE` form used by OKX, KuCoin and Coinbase.
    pub fn dashed(&self) -> SmolStr {
        format_smolstr!("{}-{}", self.base, self.quote)
    }
}

impl fmt::Display for MarketSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.settle {
            Some(settle) => write!(f, "{}/{}:{}", self.base, self.quote, settle),
            None => write!(f, "{}/{}", self.base, self.quote),
        }
    }
}

impl FromStr for MarketSymbol {
    type Err = VenueParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || VenueParseError::InvalidSymbol(input.to_string());

        let (pair, settle) = match input.split_once(':') {
            Some((pair, settle)) => (pair, Some(settle)),
            None => (input, None),
        };
        let (base, quote) = pair.split_once('/').ok_or_else(invalid)?;

        if base.is_empty() || quote.is_empty() || settle.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        Ok(match settle {
            Some(settle) => MarketSymbol::perpetual(base, quote, settle),
            None => MarketSymbol::spot(base, quote),
        })
    }
}

/// Normalised 24h ticker snapshot.
#[derive(Copy, Clone, PartialEq, Debug, Default, Constructor, Deserialize, Serialize)]
pub struct TickerReading {
    pub last_price: f64,
    /// Rolling 24h volume in base asset units.
    pub base_volume: f64,
    /// Rolling 24h volume in quote currency, when the venue reports it.
    pub quote_volume: Option<f64>,
}

/// Normalised daily OHLCV bar as returned by a venue.
#[derive(Copy, Clone, PartialEq, Debug, Constructor, Deserialize, Serialize)]
pub struct RawBar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Volume in base asset units.
    pub volume: f64,
}

/// Client capable of the three upstream operations the pipeline consumes.
#[async_trait]
pub trait MarketClient: Send + Sync {
    fn venue(&self) -> VenueId;

    /// List every market symbol listed on this venue.
    async fn load_markets(&self) -> Result<Vec<MarketSymbol>, ApiError>;

    /// Fetch the rolling 24h ticker for a single symbol.
    async fn fetch_ticker(&self, symbol: &MarketSymbol) -> Result<TickerReading, ApiError>;

    /// Fetch up to `limit` of the most recent daily bars, oldest first.
    async fn fetch_daily_bars(
        &self,
        symbol: &MarketSymbol,
        limit: usize,
    ) -> Result<Vec<RawBar>, ApiError>;
}

/// Collection of [`MarketClient`]s keyed by [`VenueId`].
#[derive(Clone, Default)]
pub struct Venues(FnvHashMap<VenueId, Arc<dyn MarketClient>>);

impl Venues {
    pub fn insert(&mut self, client: Arc<dyn MarketClient>) -> Option<Arc<dyn MarketClient>> {
        self.0.insert(client.venue(), client)
    }

    pub fn get(&self, venue: &VenueId) -> Option<&Arc<dyn MarketClient>> {
        self.0.get(venue)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Arc<dyn MarketClient>> for Venues {
    fn from_iter<T: IntoIterator<Item = Arc<dyn MarketClient>>>(iter: T) -> Self {
        let mut venues = Venues::default();
        for client in iter {
            venues.insert(client);
        }
        venues
    }
}

impl fmt::Debug for Venues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}
