use crate::{
    dataset::HistoricalDataset,
    exchange::{ExchangeId, ProductType, VenueId},
};
use chrono::NaiveDate;
use derive_more::{Display, From};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity a [`MarketShareRow`] is computed for.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub enum ShareKey {
    /// A single venue, spot and perpetual counted separately.
    Venue(VenueId),
    /// A base exchange, possibly merging its spot and perpetual venues.
    Exchange(ExchangeId),
}

impl ShareKey {
    pub fn exchange(&self) -> ExchangeId {
        match self {
            ShareKey::Venue(venue) => venue.exchange,
            ShareKey::Exchange(exchange) => *exchange,
        }
    }
}

/// Share of one key in the total USD volume of one date.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketShareRow {
    pub date: NaiveDate,
    pub key: ShareKey,
    pub volume_usd: f64,
    pub total_volume_usd: f64,
    pub share_pct: f64,
}

/// How perpetual volume is counted when computing shares per exchange.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize, Serialize)]
pub enum AggregationMode {
    /// Spot volume only, perpetual volume is excluded from totals.
    SpotOnly,
    /// Spot and perpetual volume summed per base exchange.
    #[default]
    SpotAndPerp,
}

fn share_pct(volume: f64, total: f64) -> f64 {
    if total > 0.0 { volume / total * 100.0 } else { 0.0 }
}

/// Convert per-date volume per key into share rows, largest share first within a date.
fn rows_from_volumes(volumes: BTreeMap<NaiveDate, IndexMap<ShareKey, f64>>) -> Vec<MarketShareRow> {
    volumes
        .into_iter()
        .flat_map(|(date, by_key)| {
            let total = by_key.values().sum::<f64>();
            let mut rows = by_key
                .into_iter()
                .map(|(key, volume_usd)| MarketShareRow {
                    date,
                    key,
                    volume_usd,
                    total_volume_usd: total,
                    share_pct: share_pct(volume_usd, total),
                })
                .collect::<Vec<_>>();

            rows.sort_by(|a, b| b.volume_usd.total_cmp(&a.volume_usd));
            rows
        })
        .collect()
}

/// Share of every venue in the total USD volume of each date.
pub fn daily_market_share(dataset: &HistoricalDataset) -> Vec<MarketShareRow> {
    let mut volumes = BTreeMap::<NaiveDate, IndexMap<ShareKey, f64>>::new();
    for candle in dataset {
        *volumes
            .entry(candle.date)
            .or_default()
            .entry(ShareKey::Venue(candle.venue))
            .or_default() += candle.volume_usd;
    }

    rows_from_volumes(volumes)
}

/// Share of every base exchange in the total USD volume of each date, under `mode`.
pub fn market_share_by_mode(dataset: &HistoricalDataset, mode: AggregationMode) -> Vec<MarketShareRow> {
    let mut volumes = BTreeMap::<NaiveDate, IndexMap<ShareKey, f64>>::new();
    for candle in dataset {
        if mode == AggregationMode::SpotOnly && candle.product() == ProductType::Perpetual {
            continue;
        }

        *volumes
            .entry(candle.date)
            .or_default()
            .entry(ShareKey::Exchange(candle.exchange()))
            .or_default() += candle.volume_usd;
    }

    rows_from_volumes(volumes)
}

/// Regional grouping of exchanges.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Region {
    /// KRW settling exchanges.
    Kr,
    NonKr,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Region::Kr => "KR",
            Region::NonKr => "Non-KR",
        })
    }
}

impl From<ExchangeId> for Region {
    fn from(exchange: ExchangeId) -> Self {
        if exchange.is_krw_exchange() {
            Region::Kr
        } else {
            Region::NonKr
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionalShareRow {
    pub date: NaiveDate,
    pub region: Region,
    pub volume_usd: f64,
    pub share_pct: f64,
}

/// KR vs Non-KR volume & share per date. Both regions are present for every date.
pub fn regional_share(rows: &[MarketShareRow]) -> Vec<RegionalShareRow> {
    let mut volumes = BTreeMap::<NaiveDate, BTreeMap<Region, f64>>::new();
    for row in rows {
        let by_region = volumes.entry(row.date).or_default();
        *by_region.entry(Region::from(row.key.exchange())).or_default() += row.volume_usd;
    }

    volumes
        .into_iter()
        .flat_map(|(date, by_region)| {
            let total = by_region.values().sum::<f64>();
            [Region::Kr, Region::NonKr].map(|region| {
                let volume_usd = by_region.get(&region).copied().unwrap_or_default();
                RegionalShareRow {
                    date,
                    region,
                    volume_usd,
                    share_pct: share_pct(volume_usd, total),
                }
            })
        })
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct AverageShare {
    pub key: ShareKey,
    pub share_pct: f64,
    /// Number of dates the key was present on.
    pub days: usize,
}

/// Mean share per key over every row dated on or after `since`, largest first.
pub fn average_share(rows: &[MarketShareRow], since: NaiveDate) -> Vec<AverageShare> {
    let mut sums = IndexMap::<ShareKey, (f64, usize)>::new();
    for row in rows.iter().filter(|row| row.date >= since) {
        let (sum, days) = sums.entry(row.key).or_default();
        *sum += row.share_pct;
        *days += 1;
    }

    let mut averages = sums
        .into_iter()
        .map(|(key, (sum, days))| AverageShare {
            key,
            share_pct: sum / days as f64,
            days,
        })
        .collect::<Vec<_>>();

    averages.sort_by(|a, b| b.share_pct.total_cmp(&a.share_pct));
    averages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_utils::candle;

    fn date(input: &str) -> NaiveDate {
        input.parse().unwrap()
    }

    #[test]
    fn test_daily_shares_sum_to_100() {
        let dataset = HistoricalDataset::new([
            candle("2024-01-01", "binance", 100.0, 1.0),
            candle("2024-01-01", "okx", 200.0, 1.0),
            candle("2024-01-01", "bybit_perp", 33.0, 1.0),
            candle("2024-01-02", "binance", 10.0, 1.0),
        ]);

        let rows = daily_market_share(&dataset);
        assert_eq!(rows.len(), 4);

        for day in dataset.dates() {
            let sum = rows
                .iter()
                .filter(|row| row.date == day)
                .map(|row| row.share_pct)
                .sum::<f64>();
            assert!((sum - 100.0).abs() < 1e-9, "{day} sums to {sum}");
        }

        assert_eq!(rows[0].key, ShareKey::Venue("okx".parse().unwrap()));
        assert_eq!(rows[0].total_volume_usd, 333.0);
    }

    #[test]
    fn test_zero_total_yields_zero_share() {
        let rows = rows_from_volumes(BTreeMap::from([(
            date("2024-01-01"),
            IndexMap::from([(ShareKey::Exchange(ExchangeId::Okx), 0.0)]),
        )]));

        assert_eq!(rows[0].share_pct, 0.0);
    }

    #[test]
    fn test_market_share_by_mode() {
        struct TestCase {
            mode: AggregationMode,
            expected_binance: f64,
            expected_total: f64,
        }

        let dataset = HistoricalDataset::new([
            candle("2024-01-01", "binance", 50.0, 1.0),
            candle("2024-01-01", "binance_perp", 150.0, 1.0),
            candle("2024-01-01", "coinbase", 50.0, 1.0),
        ]);

        let tests = vec![
            TestCase {
                // TC0: perpetual merged into its base exchange
                mode: AggregationMode::SpotAndPerp,
                expected_binance: 200.0,
                expected_total: 250.0,
            },
            TestCase {
                // TC1: perpetual excluded entirely
                mode: AggregationMode::SpotOnly,
                expected_binance: 50.0,
                expected_total: 100.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let rows = market_share_by_mode(&dataset, test.mode);
            let binance = rows
                .iter()
                .find(|row| row.key == ShareKey::Exchange(ExchangeId::Binance))
                .unwrap();

            assert_eq!(rows.len(), 2, "TC{} failed", index);
            assert_eq!(binance.volume_usd, test.expected_binance, "TC{} failed", index);
            assert_eq!(binance.total_volume_usd, test.expected_total, "TC{} failed", index);
        }
    }

    #[test]
    fn test_share_key_display_honours_width() {
        let venue = ShareKey::Venue(VenueId::perpetual(ExchangeId::Binance));
        let exchange = ShareKey::Exchange(ExchangeId::Kraken);

        assert_eq!(format!("{venue:>14}|"), "  binance_perp|");
        assert_eq!(format!("{exchange:<8}|"), "kraken  |");
        assert_eq!(format!("{:<8}|", Region::NonKr), "Non-KR  |");
    }

    #[test]
    fn test_regional_share() {
        let dataset = HistoricalDataset::new([
            candle("2024-01-01", "upbit", 25.0, 1.0),
            candle("2024-01-01", "bithumb", 25.0, 1.0),
            candle("2024-01-01", "binance", 150.0, 1.0),
            candle("2024-01-02", "binance", 10.0, 1.0),
        ]);

        let regional = regional_share(&daily_market_share(&dataset));
        assert_eq!(regional.len(), 4);

        assert_eq!(regional[0].region, Region::Kr);
        assert_eq!(regional[0].volume_usd, 50.0);
        assert_eq!(regional[0].share_pct, 25.0);
        assert_eq!(regional[1].share_pct, 75.0);

        assert_eq!(regional[2].region, Region::Kr);
        assert_eq!(regional[2].share_pct, 0.0);
        assert_eq!(regional[3].share_pct, 100.0);
    }

    #[test]
    fn test_average_share_since() {
        let dataset = HistoricalDataset::new([
            candle("2024-01-01", "binance", 100.0, 1.0),
            candle("2024-01-02", "binance", 50.0, 1.0),
            candle("2024-01-02", "okx", 50.0, 1.0),
            candle("2024-01-03", "binance", 30.0, 1.0),
            candle("2024-01-03", "okx", 70.0, 1.0),
        ]);

        let rows = market_share_by_mode(&dataset, AggregationMode::SpotAndPerp);
        let averages = average_share(&rows, date("2024-01-02"));

        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].key, ShareKey::Exchange(ExchangeId::Okx));
        assert_eq!(averages[0].share_pct, 60.0);
        assert_eq!(averages[0].days, 2);
        assert_eq!(averages[1].share_pct, 40.0);
    }
}
