use super::{
    MarketSymbol, ProductType, RawBar, TickerReading,
    de::{BarLayout, EpochUnit, de_flexible_f64, de_opt_flexible_f64},
    rest::{RestRequest, VenueApi},
};
use crate::error::{ApiError, mentions_unknown_symbol};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// [`Okx`] REST base url.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-api-resources-and-support>
pub const BASE_URL_OKX: &str = "https://www.okx.com";

/// OKX `code` signalling too many requests.
const CODE_RATE_LIMIT: &str = "50011";

/// OKX `code` signalling an unknown instrument.
const CODE_UNKNOWN_INSTRUMENT: &str = "51001";

/// OKX v5 venue, `instType=SPOT` or `instType=SWAP`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Okx {
    product: ProductType,
}

impl Okx {
    pub fn new(product: ProductType) -> Self {
        Self { product }
    }

    fn inst_type(&self) -> &'static str {
        match self.product {
            ProductType::Spot => "SPOT",
            ProductType::Perpetual => "SWAP",
        }
    }

    fn inst_id(&self, symbol: &MarketSymbol) -> String {
        match self.product {
            ProductType::Spot => symbol.dashed().to_string(),
            ProductType::Perpetual => format!("{}-SWAP", symbol.dashed()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// ### Raw Payload Examples
/// See docs: <https://www.okx.com/docs-v5/en/#public-data-rest-api-get-instruments>
///```json
/// {"instId": "SOL-USDT-SWAP", "instType": "SWAP", "baseCcy": "", "quoteCcy": "", "settleCcy": "USDT", "uly": "SOL-USDT", "ctType": "linear", "state": "live"}
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxInstrument {
    #[serde(default)]
    base_ccy: String,
    #[serde(default)]
    quote_ccy: String,
    #[serde(default)]
    settle_ccy: String,
    #[serde(default)]
    uly: String,
    #[serde(default)]
    ct_type: String,
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OkxTicker {
    #[serde(deserialize_with = "de_flexible_f64")]
    pub last: f64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub vol24h: f64,
    #[serde(default, deserialize_with = "de_opt_flexible_f64")]
    pub vol_ccy24h: Option<f64>,
}

impl OkxTicker {
    /// Spot `vol24h` is in base currency and `volCcy24h` in quote; swaps report contracts and base.
    pub(crate) fn reading(&self, product: ProductType) -> TickerReading {
        match product {
            ProductType::Spot => TickerReading::new(self.last, self.vol24h, self.vol_ccy24h),
            ProductType::Perpetual => {
                TickerReading::new(self.last, self.vol_ccy24h.unwrap_or_default(), None)
            }
        }
    }
}

/// Unwrap the `data` array of an OKX v5 envelope, mapping non-zero `code`s onto [`ApiError`].
pub(crate) fn parse_data<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ApiError> {
    let response: OkxResponse = serde_json::from_str(body)?;

    match response.code.as_str() {
        "0" => Ok(serde_json::from_value(response.data)?),
        CODE_RATE_LIMIT => Err(ApiError::RateLimited {
            status: None,
            message: response.msg,
        }),
        CODE_UNKNOWN_INSTRUMENT => Err(ApiError::UnsupportedAsset(response.msg)),
        _ if mentions_unknown_symbol(&response.msg) => Err(ApiError::UnsupportedAsset(response.msg)),
        code => Err(ApiError::Rejected {
            status: None,
            message: format!("code {code}: {}", response.msg),
        }),
    }
}

impl VenueApi for Okx {
    fn base_url(&self) -> &'static str {
        BASE_URL_OKX
    }

    fn markets_request(&self) -> RestRequest {
        RestRequest::new("/api/v5/public/instruments").query("instType", self.inst_type())
    }

    fn parse_markets(&self, body: &str) -> Result<Vec<MarketSymbol>, ApiError> {
        let instruments = parse_data::<OkxInstrument>(body)?;

        Ok(instruments
            .into_iter()
            .filter(|instrument| instrument.state == "live")
            .filter_map(|instrument| match self.product {
                ProductType::Spot => Some(MarketSymbol::spot(
                    instrument.base_ccy,
                    instrument.quote_ccy,
                )),
                ProductType::Perpetual => {
                    if instrument.ct_type != "linear" {
                        return None;
                    }
                    let (base, quote) = instrument.uly.split_once('-')?;
                    Some(MarketSymbol::perpetual(base, quote, instrument.settle_ccy.as_str()))
                }
            })
            .collect())
    }

    fn ticker_request(&self, symbol: &MarketSymbol) -> RestRequest {
        RestRequest::new("/api/v5/market/ticker").query("instId", self.inst_id(symbol))
    }

    fn parse_ticker(&self, body: &str) -> Result<TickerReading, ApiError> {
        parse_data::<OkxTicker>(body)?
            .first()
            .map(|ticker| ticker.reading(self.product))
            .ok_or_else(|| ApiError::Malformed("empty OKX ticker data".to_string()))
    }

    fn bars_request(&self, symbol: &MarketSymbol, limit: usize) -> RestRequest {
        RestRequest::new("/api/v5/market/candles")
            .query("instId", self.inst_id(symbol))
            .query("bar", "1Dutc")
            .query("limit", limit)
    }

    fn parse_bars(&self, body: &str) -> Result<Vec<RawBar>, ApiError> {
        let rows = parse_data::<Vec<Value>>(body)?;

        let layout = match self.product {
            ProductType::Spot => BarLayout::standard(EpochUnit::Millis),
            ProductType::Perpetual => BarLayout {
                volume: 6,
                ..BarLayout::standard(EpochUnit::Millis)
            },
        };

        layout.parse_rows(&rows)
    }
}
