use crate::exchange::{ExchangeId, MarketSymbol, ProductType, VenueId};
use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One normalised daily bar of one venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Candle {
    /// UTC calendar day of the bar's open time.
    pub date: NaiveDate,
    pub venue: VenueId,
    pub symbol: MarketSymbol,
    /// Raw volume in base asset units.
    pub volume_base: f64,
    /// USD notional volume, always strictly positive.
    pub volume_usd: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn exchange(&self) -> ExchangeId {
        self.venue.exchange
    }

    pub fn product(&self) -> ProductType {
        self.venue.product
    }
}

/// USD volume of a dataset split by product.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct ProductTotals {
    pub spot_usd: f64,
    pub perpetual_usd: f64,
}

impl ProductTotals {
    pub fn total_usd(&self) -> f64 {
        self.spot_usd + self.perpetual_usd
    }
}

/// Deduplicated, date ordered collection of [`Candle`]s.
///
/// Holds at most one [`Candle`] per (date, venue). When the input contains duplicates, the one
/// appearing last wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HistoricalDataset {
    candles: Vec<Candle>,
}

impl HistoricalDataset {
    pub fn new<Iter>(candles: Iter) -> Self
    where
        Iter: IntoIterator<Item = Candle>,
    {
        let mut unique = IndexMap::<(NaiveDate, VenueId), Candle>::new();
        for candle in candles {
            unique.insert((candle.date, candle.venue), candle);
        }

        let mut candles = unique.into_values().collect::<Vec<_>>();
        candles.sort_by_key(|candle| candle.date);

        Self { candles }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// First & last date covered.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.candles.first()?.date, self.candles.last()?.date))
    }

    /// Distinct dates in ascending order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.candles.iter().map(|candle| candle.date).dedup().collect()
    }

    /// Distinct venues in order of first appearance.
    pub fn venues(&self) -> IndexSet<VenueId> {
        self.candles.iter().map(|candle| candle.venue).collect()
    }

    /// Distinct base exchanges in order of first appearance.
    pub fn exchanges(&self) -> IndexSet<ExchangeId> {
        self.candles.iter().map(Candle::exchange).collect()
    }

    pub fn total_volume_usd(&self) -> f64 {
        self.candles.iter().map(|candle| candle.volume_usd).sum()
    }

    pub fn product_totals(&self) -> ProductTotals {
        self.candles
            .iter()
            .fold(ProductTotals::default(), |mut totals, candle| {
                match candle.product() {
                    ProductType::Spot => totals.spot_usd += candle.volume_usd,
                    ProductType::Perpetual => totals.perpetual_usd += candle.volume_usd,
                }
                totals
            })
    }

    /// USD volume per date and venue.
    pub fn volume_pivot(&self) -> BTreeMap<NaiveDate, IndexMap<VenueId, f64>> {
        let mut pivot = BTreeMap::<NaiveDate, IndexMap<VenueId, f64>>::new();
        for candle in &self.candles {
            *pivot
                .entry(candle.date)
                .or_default()
                .entry(candle.venue)
                .or_default() += candle.volume_usd;
        }
        pivot
    }

    /// Daily close price, taken from Binance spot when present, else the first candle of the
    /// date.
    pub fn close_prices(&self) -> BTreeMap<NaiveDate, f64> {
        let reference = VenueId::spot(ExchangeId::Binance);

        self.candles
            .iter()
            .chunk_by(|candle| candle.date)
            .into_iter()
            .filter_map(|(date, candles)| {
                let candles = candles.collect::<Vec<_>>();
                candles
                    .iter()
                    .find(|candle| candle.venue == reference)
                    .or_else(|| candles.first())
                    .map(|candle| (date, candle.close))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a HistoricalDataset {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}


#[cfg(test)]
mod tests {
    use super::{test_utils::candle, *};

    #[test]
    fn test_dedup_keeps_last() {
        let dataset = HistoricalDataset::new([
            candle("2024-01-02", "okx", 10.0, 1.0),
            candle("2024-01-01", "binance", 100.0, 1.0),
            candle("2024-01-01", "binance_perp", 300.0, 1.0),
            candle("2024-01-01", "binance", 200.0, 1.0),
        ]);

        assert_eq!(dataset.len(), 3);

        let binance = dataset
            .iter()
            .filter(|candle| candle.venue == VenueId::spot(ExchangeId::Binance))
            .collect::<Vec<_>>();
        assert_eq!(binance.len(), 1);
        assert_eq!(binance[0].volume_usd, 200.0);

        let dates = dataset.dates();
        assert_eq!(
            dates,
            vec![
                "2024-01-01".parse::<NaiveDate>().unwrap(),
                "2024-01-02".parse::<NaiveDate>().unwrap()
            ]
        );
        assert_eq!(dataset.date_range(), Some((dates[0], dates[1])));
    }

    #[test]
    fn test_summaries() {
        let dataset = HistoricalDataset::new([
            candle("2024-01-01", "okx", 50.0, 101.0),
            candle("2024-01-01", "binance", 100.0, 100.0),
            candle("2024-01-01", "binance_perp", 300.0, 100.5),
            candle("2024-01-02", "okx", 60.0, 103.0),
            candle("2024-01-02", "okx_perp", 40.0, 102.0),
        ]);

        assert_eq!(
            dataset.exchanges().into_iter().collect::<Vec<_>>(),
            vec![ExchangeId::Okx, ExchangeId::Binance]
        );
        assert_eq!(dataset.venues().len(), 4);

        let totals = dataset.product_totals();
        assert_eq!(totals.spot_usd, 210.0);
        assert_eq!(totals.perpetual_usd, 340.0);
        assert_eq!(totals.total_usd(), dataset.total_volume_usd());

        let closes = dataset.close_prices().into_values().collect::<Vec<_>>();
        assert_eq!(closes, vec![100.0, 103.0]);

        let pivot = dataset.volume_pivot();
        let first = pivot.values().next().unwrap();
        assert_eq!(first[&VenueId::perpetual(ExchangeId::Binance)], 300.0);
        assert_eq!(pivot.len(), 2);
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = HistoricalDataset::default();
        assert!(dataset.is_empty());
        assert_eq!(dataset.date_range(), None);
        assert!(dataset.close_prices().is_empty());
    }
}
