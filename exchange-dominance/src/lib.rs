#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Exchange Dominance
//! Fault-tolerant multi-exchange volume aggregation. Fetches daily OHLCV bars and 24h tickers
//! of any listed asset from the major spot & perpetual venues, normalises every volume figure to
//! USD, and computes each exchange's daily share of the cross-exchange total.
//!
//! The pipeline is built to return *partial data with an explainable gap* rather than fail:
//! * Every upstream call runs through a [`ResilientOperation`](retry::ResilientOperation) that
//!   retries transient failures with exponential backoff & jitter.
//! * The terminal outcome of each call is recorded in a session scoped
//!   [`ErrorLedger`](ledger::ErrorLedger), which explains why an exchange is missing.
//! * Spot snapshots that exhaust the primary path fall back to alternate public endpoints via
//!   the [`FallbackSource`](fallback::FallbackSource).
//!
//! Exchanges are visited strictly sequentially, in catalog priority order, with a minimum
//! spacing between two requests to the same exchange.
//!
//! ## Example
//! ```rust,no_run
//! use exchange_dominance::{AnalyzerConfig, VolumeAnalyzer, share::AggregationMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), exchange_dominance::error::AnalyzerError> {
//!     let mut analyzer = VolumeAnalyzer::new(AnalyzerConfig::from_env())?;
//!     analyzer.clear_session();
//!
//!     let dataset = analyzer.fetch_historical("SOL", 30).await?;
//!     let shares = analyzer.market_share_by_mode(&dataset, AggregationMode::SpotAndPerp);
//!
//!     for row in shares {
//!         println!("{} {:>12} {:>6.2}%", row.date, row.key, row.share_pct);
//!     }
//!
//!     for missing in analyzer.missing_exchanges(&dataset) {
//!         println!("{} missing: {} ({})", missing.exchange, missing.reason, missing.guidance);
//!     }
//!
//!     Ok(())
//! }
//! ```

/// All [`Error`](std::error::Error)s generated in Exchange Dominance.
pub mod error;

/// Exchange & venue identifiers, the [`MarketClient`](exchange::MarketClient) seam and the
/// concrete REST adapters of every supported exchange.
pub mod exchange;

/// Session scoped record of upstream operation outcomes.
pub mod ledger;

/// [`RetryPolicy`](retry::RetryPolicy) and the ledgered
/// [`ResilientOperation`](retry::ResilientOperation) wrapper.
pub mod retry;

/// Alternate public ticker endpoints consulted once the primary snapshot path is exhausted.
pub mod fallback;

/// Conversion of raw venue volume into USD notional volume.
pub mod normalise;

/// Normalised [`Candle`](dataset::Candle)s and the deduplicated
/// [`HistoricalDataset`](dataset::HistoricalDataset).
pub mod dataset;

/// Sequential per-venue daily bar aggregation.
pub mod aggregator;

/// Daily market share calculations.
pub mod share;

/// Rolling 24h volume snapshot, current price and supported pairs.
pub mod snapshot;

/// [`AnalyzerConfig`] and its environment overrides.
pub mod config;

/// [`VolumeAnalyzer`] session facade.
pub mod analyzer;

pub use analyzer::VolumeAnalyzer;
pub use config::AnalyzerConfig;
