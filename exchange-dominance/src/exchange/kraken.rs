use super::{
    MarketSymbol, RawBar, TickerReading,
    de::{BarLayout, EpochUnit, value_to_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::{ApiError, mentions_unknown_symbol};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// [`Kraken`] REST base url.
///
/// See docs: <https://docs.kraken.com/api/docs/rest-api/get-tradable-asset-pairs>
pub const BASE_URL_KRAKEN: &str = "https://api.kraken.com";

/// Daily OHLC interval in minutes.
const INTERVAL_DAY: u32 = 1440;

/// Kraken lists bitcoin as `XBT`.
const KRAKEN_BITCOIN: &str = "XBT";

/// Kraken spot venue.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Kraken;

impl Kraken {
    fn pair(symbol: &MarketSymbol) -> String {
        let base = match symbol.base.as_str() {
            "BTC" => KRAKEN_BITCOIN,
            base => base,
        };
        format!("{base}{}", symbol.quote)
    }
}

/// Kraken response envelope. Failures are reported in `error` with HTTP 200.
///
/// ### Raw Payload Examples
/// See docs: <https://docs.kraken.com/api/docs/rest-api/get-ticker-information>
///```json
/// {"error": ["EQuery:Unknown asset pair"]}
/// ```
#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct KrakenAssetPair {
    wsname: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// ### Raw Payload Examples
/// See docs: <https://docs.kraken.com/api/docs/rest-api/get-ticker-information>
///```json
/// {"a": ["150.6", "1", "1.0"], "b": ["150.4", "1", "1.0"], "c": ["150.5", "0.5"], "v": ["100", "1000"], "p": ["150.1", "149.9"]}
/// ```
#[derive(Debug, Deserialize)]
struct KrakenTicker {
    /// Last trade `[price, lot volume]`.
    c: Vec<Value>,
    /// Volume `[today, last 24 hours]`.
    v: Vec<Value>,
}

/// Unwrap the `result` object of a Kraken envelope, mapping `error` entries onto [`ApiError`].
fn parse_result(body: &str) -> Result<Map<String, Value>, ApiError> {
    let response: KrakenResponse = serde_json::from_str(body)?;

    if let Some(error) = response.error.first() {
        return Err(if error.contains("EAPI:Rate limit") || error.contains("EGeneral:Too many") {
            ApiError::RateLimited {
                status: None,
                message: error.clone(),
            }
        } else if mentions_unknown_symbol(error) {
            ApiError::UnsupportedAsset(error.clone())
        } else {
            ApiError::Rejected {
                status: None,
                message: response.error.join(", "),
            }
        });
    }

    response
        .result
        .ok_or_else(|| ApiError::Malformed("Kraken response without result".to_string()))
}

/// The single pair entry of a `result` object, keyed by Kraken's internal pair name.
fn single_pair<T: DeserializeOwned>(mut result: Map<String, Value>) -> Result<T, ApiError> {
    result.remove("last");

    let value = result
        .into_iter()
        .next()
        .map(|(_, value)| value)
        .ok_or_else(|| ApiError::Malformed("empty Kraken result".to_string()))?;

    Ok(serde_json::from_value(value)?)
}

impl VenueApi for Kraken {
    fn base_url(&self) -> &'static str {
        BASE_URL_KRAKEN
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/0/public/AssetPairs")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let result = parse_result(body)?;

        Ok(result
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_value::<KrakenAssetPair>(value).ok())
            .filter(|pair| pair.status.as_deref().is_none_or(|status| status == "online"))
            .filter_map(|pair| {
                let wsname = pair.wsname?;
                let (base, quote) = wsname.split_once('/')?;
                let base = match base {
                    KRAKEN_BITCOIN => "BTC",
                    base => base,
                };
                Some(MarketSymbol::spot(base, quote))
            })
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/0/public/Ticker").query("pair", Self::pair(symbol))
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        let ticker = single_pair::<KrakenTicker>(parse_result(body)?)?;

        let last_price = ticker.c.first().and_then(value_to_f64);
        let volume = ticker.v.get(1).and_then(value_to_f64);

        match (last_price, volume) {
            (Some(last_price), Some(volume)) => Ok(TickerReading::new(last_price, volume, None)),
            _ => Err(ApiError::Malformed(format!(
                "unexpected Kraken ticker: c={:?} v={:?}",
                ticker.c, ticker.v
            ))),
        }
    }

    fn bars_request(&self, symbol: &MarketSymbol, _: usize) -> RestRequest {
        RestRequest::new("/0/public/OHLC")
            .query("pair", Self::pair(symbol))
            .query("interval", INTERVAL_DAY)
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        // [time, open, high, low, close, vwap, volume, count]
        let rows = single_pair::<Vec<Vec<Value>>>(parse_result(body)?)?;

        BarLayout {
            volume: 6,
            ..BarLayout::standard(EpochUnit::Secs)
        }
        .parse_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_kraken_markets_map_xbt() {
        let input = r#"
            {
                "error": [],
                "result": {
                    "XBTUSDT": {"altname": "XBTUSDT", "wsname": "XBT/USDT", "base": "XXBT", "quote": "USDT", "status": "online"},
                    "SOLUSDT": {"altname": "SOLUSDT", "wsname": "SOL/USDT", "base": "SOL", "quote": "USDT", "status": "online"},
                    "LUNAUSD": {"altname": "LUNAUSD", "wsname": "LUNA/USD", "base": "LUNA", "quote": "ZUSD", "status": "delisted"}
                }
            }
        "#;

        let mut actual = Kraken.parse_markets(input).unwrap();
        actual.sort();
        assert_eq!(
            actual,
            vec![
                MarketSymbol::spot("BTC", "USDT"),
                MarketSymbol::spot("SOL", "USDT")
            ]
        );

        let request = Kraken.ticker_request(&MarketSymbol::spot("BTC", "USDT"));
        assert_eq!(request.query, vec![("pair", "XBTUSDT".to_string())]);
    }

    #[test]
    fn test_kraken_ticker() {
        let input = r#"
            {
                "error": [],
                "result": {
                    "SOLUSDT": {"a": ["150.6", "1", "1.0"], "b": ["150.4", "1", "1.0"], "c": ["150.5", "0.5"], "v": ["100", "1000"], "p": ["150.1", "149.9"]}
                }
            }
        "#;

        let actual = Kraken.parse_ticker(input).unwrap();
        assert_eq!(actual, TickerReading::new(150.5, 1000.0, None));
    }

    #[test]
    fn test_kraken_ohlc_skips_last() {
        let input = r#"
            {
                "error": [],
                "result": {
                    "SOLUSDT": [
                        [1699920000, "10", "12", "9", "11", "10.5", "100", 10],
                        [1700006400, "11", "13", "10", "12", "11.5", "200", 20]
                    ],
                    "last": 1700006400
                }
            }
        "#;

        let bars = Kraken.parse_bars(input).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].volume, 100.0);
        assert_eq!(bars[1].close, 12.0);
    }

    #[test]
    fn test_kraken_errors() {
        struct TestCase {
            input: &'static str,
            expected: ErrorKind,
        }

        let tests = vec![
            TestCase {
                // TC0: unknown pair
                input: r#"{"error": ["EQuery:Unknown asset pair"]}"#,
                expected: ErrorKind::UnsupportedAsset,
            },
            TestCase {
                // TC1: rate limit
                input: r#"{"error": ["EAPI:Rate limit exceeded"]}"#,
                expected: ErrorKind::RateLimited,
            },
            TestCase {
                // TC2: other error
                input: r#"{"error": ["EGeneral:Invalid arguments"]}"#,
                expected: ErrorKind::Rejected,
            },
            TestCase {
                // TC3: no result
                input: r#"{"error": []}"#,
                expected: ErrorKind::MalformedResponse,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Kraken.parse_ticker(test.input).unwrap_err();
            assert_eq!(actual.kind(), test.expected, "TC{} failed", index);
        }
    }
}
