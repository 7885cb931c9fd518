use super::{
    MarketSymbol, RawBar, TickerReading,
    de::{de_flexible_f64, de_opt_flexible_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::ApiError;
use chrono::NaiveDateTime;
use serde::Deserialize;

/// Upbit REST base url.
///
/// See docs: <https://global-docs.upbit.com/reference/list-trading-pairs>
pub const BASE_URL_UPBIT: &str = "https://api.upbit.com";

/// Bithumb REST base url, serving the Upbit compatible v1 API.
///
/// See docs: <https://apidocs.bithumb.com>
pub const BASE_URL_BITHUMB: &str = "https://api.bithumb.com";

/// Maximum candles returned by a single `/v1/candles/days` request.
const MAX_CANDLES: usize = 200;

/// Venue speaking the Upbit v1 public API, where markets are named `QUOTE-BASE`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct UpbitCompatible {
    base_url: &'static str,
}

impl UpbitCompatible {
    pub fn upbit() -> Self {
        Self {
            base_url: BASE_URL_UPBIT,
        }
    }

    pub fn bithumb() -> Self {
        Self {
            base_url: BASE_URL_BITHUMB,
        }
    }

    fn market(symbol: &MarketSymbol) -> String {
        format!("{}-{}", symbol.quote, symbol.base)
    }
}

#[derive(Debug, Deserialize)]
struct UpbitMarket {
    market: String,
}

/// ### Raw Payload Examples
/// See docs: <https://global-docs.upbit.com/reference/tickers>
///```json
/// {"market": "KRW-SOL", "trade_price": 202500.0, "acc_trade_volume_24h": 1000.5, "acc_trade_price_24h": 202601250.0}
/// ```
#[derive(Debug, Deserialize)]
struct UpbitTicker {
    #[serde(deserialize_with = "de_flexible_f64")]
    trade_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    acc_trade_volume_24h: f64,
    #[serde(default, deserialize_with = "de_opt_flexible_f64")]
    acc_trade_price_24h: Option<f64>,
}

/// ### Raw Payload Examples
/// See docs: <https://global-docs.upbit.com/reference/list-candles-days>
///```json
/// {
///     "market": "KRW-SOL",
///     "candle_date_time_utc": "2023-11-15T00:00:00",
///     "opening_price": 200000.0,
///     "high_price": 205000.0,
///     "low_price": 198000.0,
///     "trade_price": 202500.0,
///     "candle_acc_trade_volume": 1000.5
/// }
/// ```
#[derive(Debug, Deserialize)]
struct UpbitCandle {
    candle_date_time_utc: NaiveDateTime,
    #[serde(deserialize_with = "de_flexible_f64")]
    opening_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    high_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    low_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    trade_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    candle_acc_trade_volume: f64,
}

impl From<UpbitCandle> for RawBar {
    fn from(candle: UpbitCandle) -> Self {
        RawBar::new(
            candle.candle_date_time_utc.and_utc(),
            candle.opening_price,
            candle.high_price,
            candle.low_price,
            candle.trade_price,
            candle.candle_acc_trade_volume,
        )
    }
}

impl VenueApi for UpbitCompatible {
    fn base_url(&self) -> &'static str {
        self.base_url
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/v1/market/all")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let markets: Vec<UpbitMarket> = serde_json::from_str(body)?;

        Ok(markets
            .into_iter()
            .filter_map(|market| {
                let (quote, base) = market.market.split_once('-')?;
                Some(MarketSymbol::spot(base, quote))
            })
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/v1/ticker").query("markets", Self::market(symbol))
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        let tickers: Vec<UpbitTicker> = serde_json::from_str(body)?;

        tickers
            .first()
            .map(|ticker| {
                TickerReading::new(
                    ticker.trade_price,
                    ticker.acc_trade_volume_24h,
                    ticker.acc_trade_price_24h,
                )
            })
            .ok_or_else(|| ApiError::Malformed("empty ticker list".to_string()))
    }

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest {
        RestRequest::new("/v1/candles/days")
            .query("market", Self::market(symbol))
            .query("count", limit.min(MAX_CANDLES))
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        let candles: Vec<UpbitCandle> = serde_json::from_str(body)?;

        let mut bars = candles.into_iter().map(RawBar::from).collect::<Vec<_>>();
        bars.sort_by_key(|bar| bar.open_time);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_upbit_markets_are_quote_first() {
        let input = r#"
            [
                {"market": "KRW-SOL", "korean_name": "솔라나", "english_name": "Solana"},
                {"market": "BTC-SOL", "korean_name": "솔라나", "english_name": "Solana"}
            ]
        "#;

        let actual = UpbitCompatible::upbit().parse_markets(input).unwrap();
        assert_eq!(
            actual,
            vec![MarketSymbol::spot("SOL", "KRW"), MarketSymbol::spot("SOL", "BTC")]
        );

        let request = UpbitCompatible::bithumb().ticker_request(&actual[0]);
        assert_eq!(request.query, vec![("markets", "KRW-SOL".to_string())]);
    }

    #[test]
    fn test_upbit_ticker() {
        let input = r#"[{"market": "KRW-SOL", "trade_price": 202500.0, "acc_trade_volume_24h": 1000.5, "acc_trade_price_24h": 202601250.0}]"#;

        let actual = UpbitCompatible::upbit().parse_ticker(input).unwrap();
        assert_eq!(
            actual,
            TickerReading::new(202500.0, 1000.5, Some(202601250.0))
        );
    }

    #[test]
    fn test_upbit_candles() {
        let input = r#"
            [
                {"market": "KRW-SOL", "candle_date_time_utc": "2023-11-16T00:00:00", "candle_date_time_kst": "2023-11-16T09:00:00", "opening_price": 202500.0, "high_price": 210000.0, "low_price": 200000.0, "trade_price": 205000.0, "candle_acc_trade_volume": 2000.0},
                {"market": "KRW-SOL", "candle_date_time_utc": "2023-11-15T00:00:00", "candle_date_time_kst": "2023-11-15T09:00:00", "opening_price": 200000.0, "high_price": 205000.0, "low_price": 198000.0, "trade_price": 202500.0, "candle_acc_trade_volume": 1000.5}
            ]
        "#;

        let bars = UpbitCompatible::upbit().parse_bars(input).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open_time.to_rfc3339(), "2023-11-15T00:00:00+00:00");
        assert_eq!(bars[0].volume, 1000.5);
        assert_eq!(bars[1].close, 205000.0);
    }

    #[test]
    fn test_upbit_count_is_capped() {
        let request = UpbitCompatible::upbit().bars_request(&MarketSymbol::spot("SOL", "KRW"), 365);
        assert_eq!(request.query[1], ("count", "200".to_string()));

        let error = ApiError::from_status(404, r#"{"error":{"name":"404","message":"Code not found"}}"#);
        assert_eq!(error.kind(), ErrorKind::UnsupportedAsset);
    }
}
