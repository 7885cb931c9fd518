use super::{
    MarketSymbol, ProductType, RawBar, TickerReading,
    de::{BarLayout, EpochUnit, de_flexible_f64, de_opt_flexible_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::{ApiError, mentions_unknown_symbol};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// [`Bybit`] REST base url.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/intro>
pub const BASE_URL_BYBIT: &str = "https://api.bybit.com";

/// Bybit v5 `retCode` signalling too many requests.
const RET_CODE_RATE_LIMIT: i64 = 10006;

/// Bybit v5 venue, `category=spot` or `category=linear`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Bybit {
    product: ProductType,
}

impl Bybit {
    pub fn new(product: ProductType) -> Self {
        Self { product }
    }

    fn category(&self) -> &'static str {
        match self.product {
            ProductType::Spot => "spot",
            ProductType::Perpetual => "linear",
        }
    }
}

/// Bybit v5 response envelope.
///
/// ### Raw Payload Examples
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/tickers>
///```json
/// {
///     "retCode": 0,
///     "retMsg": "OK",
///     "result": {
///         "category": "spot",
///         "list": [{"symbol": "SOLUSDT", "lastPrice": "150.5", "volume24h": "1000", "turnover24h": "150500"}]
///     },
///     "time": 1700000000000
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct BybitList<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    settle_coin: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BybitTicker {
    #[serde(deserialize_with = "de_flexible_f64")]
    pub last_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub volume24h: f64,
    #[serde(default, deserialize_with = "de_opt_flexible_f64")]
    pub turnover24h: Option<f64>,
}

impl From<BybitTicker> for TickerReading {
    fn from(ticker: BybitTicker) -> Self {
        TickerReading::new(ticker.last_price, ticker.volume24h, ticker.turnover24h)
    }
}

/// Unwrap the `result.list` of a Bybit v5 envelope, mapping non-zero `retCode`s onto [`ApiError`].
pub(crate) fn parse_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ApiError> {
    let response: BybitResponse = serde_json::from_str(body)?;

    match response.ret_code {
        0 => {
            let result: BybitList<T> = serde_json::from_value(response.result)?;
            Ok(result.list)
        }
        RET_CODE_RATE_LIMIT => Err(ApiError::RateLimited {
            status: None,
            message: response.ret_msg,
        }),
        _ if mentions_unknown_symbol(&response.ret_msg)
            || response.ret_msg.contains("Not supported symbols") =>
        {
            Err(ApiError::UnsupportedAsset(response.ret_msg))
        }
        code => Err(ApiError::Rejected {
            status: None,
            message: format!("retCode {code}: {}", response.ret_msg),
        }),
    }
}

impl VenueApi for Bybit {
    fn base_url(&self) -> &'static str {
        BASE_URL_BYBIT
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/v5/market/instruments-info")
            .query("category", self.category())
            .query("limit", 1000)
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let instruments = parse_list::<BybitInstrument>(body)?;

        Ok(instruments
            .into_iter()
            .filter(|instrument| instrument.status == "Trading")
            .filter_map(|instrument| match self.product {
                ProductType::Spot => Some(MarketSymbol::spot(
                    instrument.base_coin,
                    instrument.quote_coin,
                )),
                ProductType::Perpetual => {
                    if instrument.contract_type.as_deref() != Some("LinearPerpetual") {
                        return None;
                    }
                    let settle = instrument
                        .settle_coin
                        .unwrap_or_else(|| instrument.quote_coin.clone());
                    Some(MarketSymbol::perpetual(
                        instrument.base_coin,
                        instrument.quote_coin,
                        settle,
                    ))
                }
            })
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/v5/market/tickers")
            .query("category", self.category())
            .query("symbol", symbol.concat())
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        parse_list::<BybitTicker>(body)?
            .into_iter()
            .next()
            .map(TickerReading::from)
            .ok_or_else(|| ApiError::Malformed("empty Bybit tickers list".to_string()))
    }

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest {
        RestRequest::new("/v5/market/kline")
            .query("category", self.category())
            .query("symbol", symbol.concat())
            .query("interval", "D")
            .query("limit", limit)
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        let rows = parse_list::<Vec<Value>>(body)?;
        BarLayout::standard(EpochUnit::Millis).parse_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bybit_linear_markets() {
        let input = r#"
            {
                "retCode": 0,
                "retMsg": "OK",
                "result": {
                    "category": "linear",
                    "list": [
                        {"symbol": "SOLUSDT", "contractType": "LinearPerpetual", "status": "Trading", "baseCoin": "SOL", "quoteCoin": "USDT", "settleCoin": "USDT"},
                        {"symbol": "SOL-27JUN25", "contractType": "LinearFutures", "status": "Trading", "baseCoin": "SOL", "quoteCoin": "USDC", "settleCoin": "USDC"},
                        {"symbol": "SOLPERP", "contractType": "LinearPerpetual", "status": "Closed", "baseCoin": "SOL", "quoteCoin": "USDC", "settleCoin": "USDC"}
                    ]
                }
            }
        "#;

        let actual = Bybit::new(ProductType::Perpetual)
            .parse_markets(input)
            .unwrap();
        assert_eq!(actual, vec![MarketSymbol::perpetual("SOL", "USDT", "USDT")]);
    }

    #[test]
    fn test_bybit_ticker_and_kline() {
        let ticker = r#"
            {
                "retCode": 0,
                "retMsg": "OK",
                "result": {"category": "spot", "list": [{"symbol": "SOLUSDT", "lastPrice": "150.5", "volume24h": "1000", "turnover24h": "150500"}]}
            }
        "#;
        let actual = Bybit::new(ProductType::Spot).parse_ticker(ticker).unwrap();
        assert_eq!(actual, TickerReading::new(150.5, 1000.0, Some(150500.0)));

        let kline = r#"
            {
                "retCode": 0,
                "retMsg": "OK",
                "result": {
                    "category": "spot",
                    "symbol": "SOLUSDT",
                    "list": [
                        ["1700006400000", "11", "13", "10", "12", "200", "2400"],
                        ["1699920000000", "10", "12", "9", "11", "100", "1100"]
                    ]
                }
            }
        "#;
        let bars = Bybit::new(ProductType::Spot).parse_bars(kline).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].open_time < bars[1].open_time);
        assert_eq!(bars[0].volume, 100.0);
    }

    #[test]
    fn test_bybit_error_codes() {
        struct TestCase {
            input: &'static str,
            expected: ErrorKind,
        }

        let tests = vec![
            TestCase {
                // TC0: rate limited
                input: r#"{"retCode": 10006, "retMsg": "Too many visits!", "result": {}}"#,
                expected: ErrorKind::RateLimited,
            },
            TestCase {
                // TC1: unknown symbol
                input: r#"{"retCode": 10001, "retMsg": "Not supported symbols", "result": {}}"#,
                expected: ErrorKind::UnsupportedAsset,
            },
            TestCase {
                // TC2: other error code
                input: r#"{"retCode": 10002, "retMsg": "invalid request", "result": {}}"#,
                expected: ErrorKind::Rejected,
            },
            TestCase {
                // TC3: success envelope without list
                input: r#"{"retCode": 0, "retMsg": "OK", "result": {}}"#,
                expected: ErrorKind::MalformedResponse,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Bybit::new(ProductType::Spot)
                .parse_ticker(test.input)
                .unwrap_err();
            assert_eq!(actual.kind(), test.expected, "TC{} failed", index);
        }
    }
}
