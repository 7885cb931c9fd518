use super::{
    MarketSymbol, RawBar, TickerReading,
    de::{BarLayout, EpochUnit, de_flexible_f64, de_opt_flexible_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::ApiError;
use serde::Deserialize;
use serde_json::Value;

/// [`BinanceSpot`] REST base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api>
pub const BASE_URL_BINANCE_SPOT: &str = "https://api.binance.com";

/// [`BinanceFuturesUsd`] REST base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/general-info>
pub const BASE_URL_BINANCE_FUTURES_USD: &str = "https://fapi.binance.com";

/// Binance spot venue.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct BinanceSpot;

/// Binance USDⓈ-M perpetual futures venue.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct BinanceFuturesUsd;

#[derive(Debug, Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbolInfo>,
}

/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Exchange-Information>
///```json
/// {
///     "symbol": "SOLUSDT",
///     "pair": "SOLUSDT",
///     "contractType": "PERPETUAL",
///     "status": "TRADING",
///     "baseAsset": "SOL",
///     "quoteAsset": "USDT",
///     "marginAsset": "USDT"
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceSymbolInfo {
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    margin_asset: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
}

/// Binance 24hr rolling ticker, identical for spot & USDⓈ-M futures.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#24hr-ticker-price-change-statistics>
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Binance24hrTicker {
    #[serde(deserialize_with = "de_flexible_f64")]
    pub last_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub volume: f64,
    #[serde(default, deserialize_with = "de_opt_flexible_f64")]
    pub quote_volume: Option<f64>,
}

impl From<Binance24hrTicker> for TickerReading {
    fn from(ticker: Binance24hrTicker) -> Self {
        TickerReading::new(ticker.last_price, ticker.volume, ticker.quote_volume)
    }
}

fn parse_klines(body: &str) -> Result<Vec<RawBar>, ApiError> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    BarLayout::standard(EpochUnit::Millis).parse_rows(&rows)
}

impl VenueApi for BinanceSpot {
    fn base_url(&self) -> &'static str {
        BASE_URL_BINANCE_SPOT
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/api/v3/exchangeInfo")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let info: BinanceExchangeInfo = serde_json::from_str(body)?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|symbol| symbol.status == "TRADING")
            .map(|symbol| MarketSymbol::spot(symbol.base_asset, symbol.quote_asset))
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/api/v3/ticker/24hr").query("symbol", symbol.concat())
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        serde_json::from_str::<Binance24hrTicker>(body)
            .map(TickerReading::from)
            .map_err(ApiError::from)
    }

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest {
        RestRequest::new("/api/v3/klines")
            .query("symbol", symbol.concat())
            .query("interval", "1d")
            .query("limit", limit)
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        parse_klines(body)
    }
}

impl VenueApi for BinanceFuturesUsd {
    fn base_url(&self) -> &'static str {
        BASE_URL_BINANCE_FUTURES_USD
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/fapi/v1/exchangeInfo")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let info: BinanceExchangeInfo = serde_json::from_str(body)?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|symbol| {
                symbol.status == "TRADING" && symbol.contract_type.as_deref() == Some("PERPETUAL")
            })
            .map(|symbol| {
                let settle = symbol
                    .margin_asset
                    .unwrap_or_else(|| symbol.quote_asset.clone());
                MarketSymbol::perpetual(symbol.base_asset, symbol.quote_asset, settle)
            })
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/fapi/v1/ticker/24hr").query("symbol", symbol.concat())
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        serde_json::from_str::<Binance24hrTicker>(body)
            .map(TickerReading::from)
            .map_err(ApiError::from)
    }

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest {
        RestRequest::new("/fapi/v1/klines")
            .query("symbol", symbol.concat())
            .query("interval", "1d")
            .query("limit", limit)
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        parse_klines(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod de {
        use super::*;

        #[test]
        fn test_binance_spot_markets() {
            let input = r#"
                {
                    "timezone": "UTC",
                    "symbols": [
                        {"symbol": "SOLUSDT", "status": "TRADING", "baseAsset": "SOL", "quoteAsset": "USDT"},
                        {"symbol": "SOLBTC", "status": "BREAK", "baseAsset": "SOL", "quoteAsset": "BTC"}
                    ]
                }
            "#;

            let actual = BinanceSpot.parse_markets(input).unwrap();
            assert_eq!(actual, vec![MarketSymbol::spot("SOL", "USDT")]);
        }

        #[test]
        fn test_binance_futures_markets() {
            let input = r#"
                {
                    "symbols": [
                        {
                            "symbol": "SOLUSDT", "pair": "SOLUSDT", "contractType": "PERPETUAL",
                            "status": "TRADING", "baseAsset": "SOL", "quoteAsset": "USDT", "marginAsset": "USDT"
                        },
                        {
                            "symbol": "SOLUSDT_250627", "pair": "SOLUSDT", "contractType": "CURRENT_QUARTER",
                            "status": "TRADING", "baseAsset": "SOL", "quoteAsset": "USDT", "marginAsset": "USDT"
                        }
                    ]
                }
            "#;

            let actual = BinanceFuturesUsd.parse_markets(input).unwrap();
            assert_eq!(actual, vec![MarketSymbol::perpetual("SOL", "USDT", "USDT")]);
        }

        #[test]
        fn test_binance_ticker() {
            let input = r#"
                {
                    "symbol": "SOLUSDT",
                    "priceChange": "-1.20",
                    "lastPrice": "150.50",
                    "volume": "1000.5",
                    "quoteVolume": "150575.25",
                    "openTime": 1700000000000,
                    "closeTime": 1700086399999
                }
            "#;

            let actual = BinanceSpot.parse_ticker(input).unwrap();
            assert_eq!(actual, TickerReading::new(150.50, 1000.5, Some(150575.25)));
        }

        #[test]
        fn test_binance_klines() {
            let input = r#"
                [
                    [1699920000000, "10.0", "12.0", "9.0", "11.0", "100.0", 1700006399999, "1100.0", 10, "50", "550", "0"],
                    [1700006400000, "11.0", "13.0", "10.0", "12.0", "200.0", 1700092799999, "2400.0", 20, "90", "1080", "0"]
                ]
            "#;

            let actual = BinanceFuturesUsd.parse_bars(input).unwrap();
            assert_eq!(actual.len(), 2);
            assert_eq!(actual[0].open_time.timestamp_millis(), 1699920000000);
            assert_eq!(actual[1].close, 12.0);
            assert_eq!(actual[1].volume, 200.0);
        }
    }

    #[test]
    fn test_binance_requests() {
        let symbol = MarketSymbol::spot("SOL", "USDT");
        let request = BinanceSpot.bars_request(&symbol, 14);

        assert_eq!(request.path, "/api/v3/klines");
        assert_eq!(
            request.query,
            vec![
                ("symbol", "SOLUSDT".to_string()),
                ("interval", "1d".to_string()),
                ("limit", "14".to_string())
            ]
        );
    }
}
