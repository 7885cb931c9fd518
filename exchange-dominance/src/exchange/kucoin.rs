use super::{
    MarketSymbol, RawBar, TickerReading,
    de::{BarLayout, EpochUnit, de_flexible_f64, de_opt_flexible_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::{ApiError, mentions_unknown_symbol};
use chrono::{Duration, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// [`KucoinSpot`] REST base url.
///
/// See docs: <https://www.kucoin.com/docs/rest/spot-trading/market-data/get-all-tickers>
pub const BASE_URL_KUCOIN_SPOT: &str = "https://api.kucoin.com";

/// [`KucoinFutures`] REST base url.
///
/// See docs: <https://www.kucoin.com/docs/rest/futures-trading/market-data/get-symbols-list>
pub const BASE_URL_KUCOIN_FUTURES: &str = "https://api-futures.kucoin.com";

const CODE_OK: &str = "200000";
const CODE_RATE_LIMIT: &str = "429000";

/// KuCoin futures lists bitcoin as `XBT`.
const FUTURES_BITCOIN: &str = "XBT";

/// KuCoin spot venue.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct KucoinSpot;

/// KuCoin USDT-margined perpetual futures venue.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct KucoinFutures;

#[derive(Debug, Deserialize)]
struct KucoinResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Unwrap the `data` field of a KuCoin envelope, mapping error `code`s onto [`ApiError`].
pub(crate) fn parse_data<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let response: KucoinResponse = serde_json::from_str(body)?;

    match response.code.as_str() {
        CODE_OK => Ok(serde_json::from_value(response.data)?),
        CODE_RATE_LIMIT => Err(ApiError::RateLimited {
            status: None,
            message: response.msg,
        }),
        _ if mentions_unknown_symbol(&response.msg) => Err(ApiError::UnsupportedAsset(response.msg)),
        code => Err(ApiError::Rejected {
            status: None,
            message: format!("code {code}: {}", response.msg),
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinSpotSymbol {
    base_currency: String,
    quote_currency: String,
    enable_trading: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinStats {
    #[serde(deserialize_with = "de_flexible_f64")]
    last: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    vol: f64,
    #[serde(default, deserialize_with = "de_opt_flexible_f64")]
    vol_value: Option<f64>,
}

/// ### Raw Payload Examples
/// See docs: <https://www.kucoin.com/docs/rest/futures-trading/market-data/get-symbols-list>
///```json
/// {"symbol": "SOLUSDTM", "baseCurrency": "SOL", "quoteCurrency": "USDT", "settleCurrency": "USDT", "type": "FFWCSX", "isInverse": false, "status": "Open"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinContract {
    base_currency: String,
    quote_currency: String,
    settle_currency: String,
    #[serde(rename = "type")]
    kind: String,
    is_inverse: bool,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinContractDetail {
    #[serde(deserialize_with = "de_flexible_f64")]
    last_trade_price: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    volume_of24h: f64,
    #[serde(default, deserialize_with = "de_opt_flexible_f64")]
    turnover_of24h: Option<f64>,
}

/// ### Raw Payload Examples
/// See docs: <https://www.kucoin.com/docs/rest/spot-trading/market-data/get-all-tickers>
///```json
/// {"time": 1700000000000, "ticker": [{"symbol": "SOL-USDT", "last": "150.5", "vol": "1000", "volValue": "150500"}]}
/// ```
#[derive(Debug, Deserialize)]
struct KucoinAllTickers {
    ticker: Vec<KucoinTickerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinTickerEntry {
    symbol: String,
    #[serde(flatten)]
    stats: KucoinStats,
}

/// Select `symbol` from a KuCoin `allTickers` snapshot.
pub(crate) fn parse_all_tickers(body: &str, symbol: &MarketSymbol) -> Result<TickerReading, ApiError> {
    let dashed = symbol.dashed();

    parse_data::<KucoinAllTickers>(body)?
        .ticker
        .into_iter()
        .find(|entry| entry.symbol == dashed.as_str())
        .map(|entry| TickerReading::new(entry.stats.last, entry.stats.vol, entry.stats.vol_value))
        .ok_or_else(|| ApiError::UnsupportedAsset(format!("{dashed} not in allTickers")))
}

impl KucoinFutures {
    fn contract(symbol: &MarketSymbol) -> String {
        let base = match symbol.base.as_str() {
            "BTC" => FUTURES_BITCOIN,
            base => base,
        };
        format!("{base}{}M", symbol.quote)
    }
}

impl VenueApi for KucoinSpot {
    fn base_url(&self) -> &'static str {
        BASE_URL_KUCOIN_SPOT
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/api/v2/symbols")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let symbols = parse_data::<Vec<KucoinSpotSymbol>>(body)?;

        Ok(symbols
            .into_iter()
            .filter(|symbol| symbol.enable_trading)
            .map(|symbol| MarketSymbol::spot(symbol.base_currency, symbol.quote_currency))
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/api/v1/market/stats").query("symbol", symbol.dashed())
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        let stats = parse_data::<KucoinStats>(body)?;
        Ok(TickerReading::new(stats.last, stats.vol, stats.vol_value))
    }

    fn bars_request(&self, symbol: &MarketSymbol, _: usize) -> RestRequest {
        RestRequest::new("/api/v1/market/candles")
            .query("type", "1day")
            .query("symbol", symbol.dashed())
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        // [time, open, close, high, low, volume, turnover]
        const LAYOUT: BarLayout = BarLayout {
            time: 0,
            unit: EpochUnit::Secs,
            open: 1,
            close: 2,
            high: 3,
            low: 4,
            volume: 5,
        };

        let rows = parse_data::<Vec<Vec<Value>>>(body)?;
        LAYOUT.parse_rows(&rows)
    }
}

impl VenueApi for KucoinFutures {
    fn base_url(&self) -> &'static str {
        BASE_URL_KUCOIN_FUTURES
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/api/v1/contracts/active")
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let contracts = parse_data::<Vec<KucoinContract>>(body)?;

        Ok(contracts
            .into_iter()
            .filter(|contract| {
                contract.kind == "FFWCSX" && !contract.is_inverse && contract.status == "Open"
            })
            .map(|contract| {
                let base = if contract.base_currency == FUTURES_BITCOIN {
                    "BTC".to_string()
                } else {
                    contract.base_currency
                };
                MarketSymbol::perpetual(base, contract.quote_currency, contract.settle_currency)
            })
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new(format!("/api/v1/contracts/{}", Self::contract(symbol)))
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        let detail = parse_data::<KucoinContractDetail>(body)?;
        Ok(TickerReading::new(
            detail.last_trade_price,
            detail.volume_of24h,
            detail.turnover_of24h,
        ))
    }

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest {
        let to = Utc::now();
        let from = to - Duration::days(limit as i64 + 1);

        RestRequest::new("/api/v1/kline/query")
            .query("symbol", Self::contract(symbol))
            .query("granularity", 1440)
            .query("from", from.timestamp_millis())
            .query("to", to.timestamp_millis())
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        let rows = parse_data::<Vec<Vec<Value>>>(body)?;
        BarLayout::standard(EpochUnit::Millis).parse_rows(&rows)
    }
}
