use crate::{
    dataset::Candle,
    exchange::{MarketSymbol, ProductType, RawBar, TickerReading, VenueId},
};

/// Fixed KRW per USD conversion rate.
pub const DEFAULT_KRW_PER_USD: f64 = 1350.0;

/// Quote currencies treated as USD.
const USD_QUOTES: [&str; 10] = [
    "USD", "USDT", "USDC", "FDUSD", "DAI", "BUSD", "TUSD", "USDE", "USDP", "PYUSD",
];

/// Classification of a pair's quote currency.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QuoteClass {
    /// USD itself or a USD pegged stablecoin.
    Usd,
    Krw,
    Unsupported,
}

impl QuoteClass {
    pub fn of(quote: &str) -> Self {
        if USD_QUOTES.contains(&quote) {
            QuoteClass::Usd
        } else if quote == "KRW" {
            QuoteClass::Krw
        } else {
            QuoteClass::Unsupported
        }
    }
}

/// Converts raw readings into USD notional volume using a fixed conversion table.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VolumeNormaliser {
    krw_per_usd: f64,
}

impl Default for VolumeNormaliser {
    fn default() -> Self {
        Self::new(DEFAULT_KRW_PER_USD)
    }
}

impl VolumeNormaliser {
    pub fn new(krw_per_usd: f64) -> Self {
        Self { krw_per_usd }
    }

    pub fn krw_per_usd(&self) -> f64 {
        self.krw_per_usd
    }

    /// Convert a quote denominated volume into USD, dropping non-positive results and
    /// unconvertible quote currencies.
    ///
    /// Perpetual contracts are USD margined and pass through unchanged.
    pub fn quote_to_usd(&self, symbol: &MarketSymbol, quote_volume: f64) -> Option<f64> {
        let usd = match (symbol.product(), QuoteClass::of(&symbol.quote)) {
            (ProductType::Perpetual, _) | (ProductType::Spot, QuoteClass::Usd) => quote_volume,
            (ProductType::Spot, QuoteClass::Krw) => quote_volume / self.krw_per_usd,
            (ProductType::Spot, QuoteClass::Unsupported) => return None,
        };

        (usd.is_finite() && usd > 0.0).then_some(usd)
    }

    /// USD volume of a 24h ticker: the reported quote volume, else base volume times last price.
    pub fn ticker_usd_volume(&self, symbol: &MarketSymbol, reading: &TickerReading) -> Option<f64> {
        let quote_volume = reading
            .quote_volume
            .filter(|volume| volume.is_finite() && *volume > 0.0)
            .unwrap_or(reading.base_volume * reading.last_price);

        self.quote_to_usd(symbol, quote_volume)
    }

    /// Convert a daily bar into a [`Candle`], or `None` if its volume is not strictly positive
    /// or its quote currency is not convertible.
    pub fn candle(&self, venue: VenueId, symbol: &MarketSymbol, bar: &RawBar) -> Option<Candle> {
        if !bar.volume.is_finite() || bar.volume <= 0.0 {
            return None;
        }

        let volume_usd = self.quote_to_usd(symbol, bar.volume * bar.close)?;

        Some(Candle {
            date: bar.open_time.date_naive(),
            venue,
            symbol: symbol.clone(),
            volume_base: bar.volume,
            volume_usd,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeId;
    use chrono::{DateTime, NaiveDate};

    fn bar(volume: f64, close: f64) -> RawBar {
        RawBar::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            close,
            close,
            close,
            close,
            volume,
        )
    }

    #[test]
    fn test_quote_class() {
        struct TestCase {
            input: &'static str,
            expected: QuoteClass,
        }

        let tests = vec![
            TestCase {
                // TC0
                input: "USDT",
                expected: QuoteClass::Usd,
            },
            TestCase {
                // TC1
                input: "USD",
                expected: QuoteClass::Usd,
            },
            TestCase {
                // TC2
                input: "FDUSD",
                expected: QuoteClass::Usd,
            },
            TestCase {
                // TC3
                input: "KRW",
                expected: QuoteClass::Krw,
            },
            TestCase {
                // TC4
                input: "BTC",
                expected: QuoteClass::Unsupported,
            },
            TestCase {
                // TC5
                input: "EUR",
                expected: QuoteClass::Unsupported,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(QuoteClass::of(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_krw_candle_conversion() {
        let normaliser = VolumeNormaliser::default();
        let venue = VenueId::spot(ExchangeId::Upbit);
        let symbol = MarketSymbol::spot("SOL", "KRW");

        let candle = normaliser.candle(venue, &symbol, &bar(1_000.0, 270_000.0)).unwrap();
        assert_eq!(candle.volume_usd, 1_000.0 * 270_000.0 / 1350.0);
        assert_eq!(candle.volume_base, 1_000.0);
        assert_eq!(candle.date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
    }

    #[test]
    fn test_usd_and_perpetual_pass_through() {
        let normaliser = VolumeNormaliser::default();

        let spot = MarketSymbol::spot("SOL", "USDT");
        let reading = TickerReading::new(150.0, 1_000.0, Some(150_000.0));
        assert_eq!(normaliser.ticker_usd_volume(&spot, &reading), Some(150_000.0));

        let no_quote = TickerReading::new(150.0, 1_000.0, None);
        assert_eq!(normaliser.ticker_usd_volume(&spot, &no_quote), Some(150_000.0));

        let perp = MarketSymbol::perpetual("SOL", "USDT", "USDT");
        assert_eq!(normaliser.quote_to_usd(&perp, 75_000.0), Some(75_000.0));
    }

    #[test]
    fn test_dropped_readings() {
        let normaliser = VolumeNormaliser::default();
        let venue = VenueId::spot(ExchangeId::Kraken);

        let usdt = MarketSymbol::spot("SOL", "USDT");
        assert!(normaliser.candle(venue, &usdt, &bar(0.0, 150.0)).is_none());
        assert!(normaliser.candle(venue, &usdt, &bar(-1.0, 150.0)).is_none());
        assert!(normaliser.candle(venue, &usdt, &bar(f64::NAN, 150.0)).is_none());

        let eur = MarketSymbol::spot("SOL", "EUR");
        assert!(normaliser.candle(venue, &eur, &bar(10.0, 150.0)).is_none());
    }
}
