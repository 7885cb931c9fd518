use crate::{
    error::{AnalyzerError, ApiError, ErrorKind},
    exchange::{
        MarketSymbol, ProductType, TickerReading, VenueId,
        binance::Binance24hrTicker,
        bybit::{self, BybitTicker},
        catalog::{ExchangeConfig, FallbackEndpoint, FallbackShape},
        kucoin,
        okx::{self, OkxTicker},
        rest::build_http_client,
    },
    ledger::{ErrorLedger, Operation, OperationOutcome},
};
use async_trait::async_trait;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

/// Browser-like headers sent to public fallback endpoints.
pub const BROWSER_HEADERS: [(&str, &str); 4] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Cache-Control", "no-cache"),
];

/// Raw unauthenticated HTTP GET used by the [`FallbackSource`].
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    async fn get(&self, url: Url) -> Result<String, ApiError>;
}

/// `reqwest` backed [`FallbackTransport`] sending [`BROWSER_HEADERS`].
#[derive(Debug, Clone)]
pub struct PublicHttp {
    http: reqwest::Client,
}

impl PublicHttp {
    pub fn new(timeout: Duration) -> Result<Self, AnalyzerError> {
        let http = build_http_client("fallback", timeout, &BROWSER_HEADERS)?;

        Ok(Self { http })
    }
}

#[async_trait]
impl FallbackTransport for PublicHttp {
    async fn get(&self, url: Url) -> Result<String, ApiError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &body));
        }

        Ok(body)
    }
}

/// Expand the `{concat}` & `{dashed}` placeholders of an endpoint for `symbol`.
pub fn fallback_url(endpoint: &FallbackEndpoint, symbol: &MarketSymbol) -> Result<Url, ApiError> {
    let raw = endpoint
        .url
        .replace("{concat}", &symbol.concat())
        .replace("{dashed}", &symbol.dashed());

    Url::parse(&raw).map_err(|error| ApiError::Rejected {
        status: None,
        message: format!("invalid fallback url {raw}: {error}"),
    })
}

/// Parse the exchange specific body of a fallback endpoint into a [`TickerReading`].
pub fn parse_fallback(
    shape: FallbackShape,
    symbol: &MarketSymbol,
    body: &str,
) -> Result<TickerReading, ApiError> {
    match shape {
        FallbackShape::Binance24hr => serde_json::from_str::<Binance24hrTicker>(body)
            .map(TickerReading::from)
            .map_err(ApiError::from),
        FallbackShape::BybitTickers => bybit::parse_list::<BybitTicker>(body)?
            .into_iter()
            .next()
            .map(TickerReading::from)
            .ok_or_else(|| ApiError::UnsupportedAsset(symbol.to_string())),
        FallbackShape::OkxTicker => okx::parse_data::<OkxTicker>(body)?
            .first()
            .map(|ticker| ticker.reading(ProductType::Spot))
            .ok_or_else(|| ApiError::UnsupportedAsset(symbol.to_string())),
        FallbackShape::KucoinAllTickers => kucoin::parse_all_tickers(body, symbol),
    }
}

/// Alternate public endpoint accessor, consulted once the primary snapshot path is exhausted.
///
/// Never fails outward: every failure is ledgered under [`Operation::FallbackTicker`] and
/// surfaces as `None`.
#[derive(Clone)]
pub struct FallbackSource {
    transport: Arc<dyn FallbackTransport>,
}

impl fmt::Debug for FallbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackSource").finish_non_exhaustive()
    }
}

impl FallbackSource {
    pub fn new(transport: Arc<dyn FallbackTransport>) -> Self {
        Self { transport }
    }

    /// [`FallbackSource`] over [`PublicHttp`].
    pub fn public(timeout: Duration) -> Result<Self, AnalyzerError> {
        Ok(Self::new(Arc::new(PublicHttp::new(timeout)?)))
    }

    pub async fn fetch_ticker(
        &self,
        config: &ExchangeConfig,
        symbol: &MarketSymbol,
        ledger: &mut ErrorLedger,
    ) -> Option<TickerReading> {
        if symbol.product() != ProductType::Spot {
            return None;
        }

        let endpoint = config.fallback.as_ref()?;
        let venue = VenueId::spot(config.id);

        info!(exchange = %venue, %symbol, "trying fallback endpoint");

        let result = match fallback_url(endpoint, symbol) {
            Ok(url) => match self.transport.get(url).await {
                Ok(body) => parse_fallback(endpoint.shape, symbol, &body),
                Err(error) => Err(error),
            },
            Err(error) => Err(error),
        };

        match result {
            Ok(reading) => {
                debug!(exchange = %venue, %symbol, ?reading, "fallback succeeded");
                ledger.record(OperationOutcome::success(venue, Operation::FallbackTicker, 1));
                Some(reading)
            }
            Err(error) if error.kind() == ErrorKind::UnsupportedAsset => {
                debug!(exchange = %venue, %symbol, %error, "fallback does not list asset");
                None
            }
            Err(error) => {
                warn!(exchange = %venue, %symbol, %error, "fallback failed");
                ledger.record(OperationOutcome::failure(
                    venue,
                    Operation::FallbackTicker,
                    &error,
                    1,
                ));
                None
            }
        }
    }
}
