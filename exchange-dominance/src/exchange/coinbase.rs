use super::{
    MarketSymbol, RawBar, TickerReading,
    de::{BarLayout, EpochUnit, de_flexible_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::ApiError;
use serde::Deserialize;
use serde_json::Value;

/// [`Coinbase`] REST base url.
///
/// See docs: <https://docs.cdp.coinbase.com/exchange/reference/exchangerestapi_getproducts>
pub const BASE_URL_COINBASE: &str = "https://api.exchange.coinbase.com";

/// Daily candle granularity in seconds.
const GRANULARITY_DAY: u32 = 86_400;

/// Coinbase Exchange spot venue.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Coinbase;

/// ### Raw Payload Examples
/// See docs: <https://docs.cdp.coinbase.com/exchange/reference/exchangerestapi_getproducts>
///```json
/// {"id": "SOL-USD", "base_currency": "SOL", "quote_currency": "USD", "status": "online", "trading_disabled": false}
/// ```
#[derive(Debug, Deserialize)]
struct CoinbaseProduct {
    base_currency: String,
    quote_currency: String,
    status: String,
    #[serde(default)]
    trading_disabled: bool,
}

/// ### Raw Payload Examples
/// See docs: <https://docs.cdp.coinbase.com/exchange/reference/exchangerestapi_getproductticker>
///```json
/// {"ask": "150.51", "bid": "150.49", "volume": "1000.5", "trade_id": 1, "price": "150.50", "size": "1", "time": "2023-11-15T00:00:00Z"}
/// ```
#[derive(Debug, Deserialize)]
struct CoinbaseTicker {
    #[serde(deserialize_with = "de_flexible_f64")]
    price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    volume: f64,
}

impl VenueApi for Coinbase {
    fn base_url(&self) -> &'static str {
        BASE_URL_COINBASE
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/products")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let products: Vec<CoinbaseProduct> = serde_json::from_str(body)?;

        Ok(products
            .into_iter()
            .filter(|product| product.status == "online" && !product.trading_disabled)
            .map(|product| MarketSymbol::spot(product.base_currency, product.quote_currency))
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new(format!("/products/{}/ticker", symbol.dashed()))
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        let ticker: CoinbaseTicker = serde_json::from_str(body)?;
        Ok(TickerReading::new(ticker.price, ticker.volume, None))
    }

    fn bars_request(&self, symbol: &MarketSymbol, _: usize) -> RestRequest {
        RestRequest::new(format!("/products/{}/candles", symbol.dashed()))
            .query("granularity", GRANULARITY_DAY)
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        // [time, low, high, open, close, volume], newest first
        const LAYOUT: BarLayout = BarLayout {
            time: 0,
            unit: EpochUnit::Secs,
            low: 1,
            high: 2,
            open: 3,
            close: 4,
            volume: 5,
        };

        let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
        LAYOUT.parse_rows(&rows)
    }
}
