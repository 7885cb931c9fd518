use crate::{
    error::{ApiError, ErrorKind},
    exchange::{ExchangeId, VenueId},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use fnv::FnvHashSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Upstream operation whose outcome is ledgered.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[display("load_markets")]
    LoadMarkets,
    #[display("fetch_ticker")]
    FetchTicker,
    #[display("fetch_ohlcv")]
    FetchOhlcv,
    #[display("fallback_ticker")]
    FallbackTicker,
}

/// Terminal outcome of one upstream operation against one venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OperationOutcome {
    pub venue: VenueId,
    pub operation: Operation,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub status: Option<u16>,
    /// Number of attempts made before this outcome was reached.
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl OperationOutcome {
    pub fn success(venue: VenueId, operation: Operation, attempts: u32) -> Self {
        Self {
            venue,
            operation,
            succeeded: true,
            error_kind: None,
            message: None,
            status: None,
            attempts,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(venue: VenueId, operation: Operation, error: &ApiError, attempts: u32) -> Self {
        Self {
            venue,
            operation,
            succeeded: false,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            status: error.status(),
            attempts,
            timestamp: Utc::now(),
        }
    }

    /// Advisory [`FailureCause`] of a failed outcome.
    pub fn cause(&self) -> Option<FailureCause> {
        if self.succeeded {
            return None;
        }

        Some(FailureCause::classify(
            self.status,
            self.message.as_deref().unwrap_or_default(),
        ))
    }
}

/// Most likely cause of a failure, inferred from the HTTP status or the message text.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    #[display("timeout")]
    Timeout,
    #[display("rate_limit")]
    RateLimit,
    #[display("access_denied")]
    AccessDenied,
    #[display("unknown")]
    Unknown,
}

impl FailureCause {
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        match status {
            Some(429) => return Self::RateLimit,
            Some(403) => return Self::AccessDenied,
            _ => {}
        }

        let message = message.to_lowercase();
        if message.contains("timeout") || message.contains("timed out") {
            Self::Timeout
        } else if message.contains("rate limit") || message.contains("too many") {
            Self::RateLimit
        } else if message.contains("forbidden")
            || message.contains("access denied")
            || message.contains("restricted")
        {
            Self::AccessDenied
        } else {
            Self::Unknown
        }
    }

    /// Human readable hint for the presentation layer.
    pub fn guidance(&self) -> &'static str {
        match self {
            FailureCause::Timeout => {
                "The exchange did not answer in time. Its API may be slow or unreachable from this network, try again later."
            }
            FailureCause::RateLimit => {
                "Too many requests were sent. Wait a few minutes before running the analysis again."
            }
            FailureCause::AccessDenied => {
                "The exchange refused the request. It may block this region or hosting provider."
            }
            FailureCause::Unknown => {
                "The exchange returned an unexpected error. Check its status page or try again later."
            }
        }
    }
}

/// Session scoped record of every ledgered [`OperationOutcome`], keyed by venue.
///
/// Created empty per analysis session and cleared explicitly by the caller before the next one.
#[derive(Debug, Clone, Default)]
pub struct ErrorLedger {
    outcomes: IndexMap<VenueId, Vec<OperationOutcome>>,
}

impl ErrorLedger {
    pub fn record(&mut self, outcome: OperationOutcome) {
        self.outcomes
            .entry(outcome.venue)
            .or_default()
            .push(outcome);
    }

    pub fn clear(&mut self) {
        self.outcomes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcomes recorded against `venue`, oldest first.
    pub fn outcomes(&self, venue: &VenueId) -> &[OperationOutcome] {
        self.outcomes
            .get(venue)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterate every recorded outcome in insertion order per venue.
    pub fn iter(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.values().flatten()
    }

    pub fn summarize(&self) -> ErrorSummary {
        let exchanges = self
            .outcomes
            .iter()
            .map(|(venue, outcomes)| {
                let successes = outcomes.iter().filter(|outcome| outcome.succeeded).count();
                let last_failure = outcomes.iter().rev().find(|outcome| !outcome.succeeded);

                let summary = ExchangeSummary {
                    attempts: outcomes.iter().map(|outcome| outcome.attempts).sum(),
                    successes,
                    failures: outcomes.len() - successes,
                    last_outcome: outcomes.last().cloned(),
                    cause: last_failure.and_then(OperationOutcome::cause),
                };

                (*venue, summary)
            })
            .collect::<IndexMap<_, _>>();

        let successful = exchanges.values().map(|summary| summary.successes).sum();
        let failed = exchanges.values().map(|summary| summary.failures).sum();

        ErrorSummary {
            total_operations: successful + failed,
            successful,
            failed,
            exchanges,
        }
    }

    /// For every `expected` exchange absent from `present`, explain why using its most recent
    /// ledgered failure.
    pub fn missing_exchanges(
        &self,
        expected: impl IntoIterator<Item = ExchangeId>,
        present: &FnvHashSet<ExchangeId>,
    ) -> Vec<MissingExchange> {
        expected
            .into_iter()
            .filter(|exchange| !present.contains(exchange))
            .map(|exchange| {
                let failure = self
                    .outcomes
                    .iter()
                    .filter(|(venue, _)| venue.exchange == exchange)
                    .flat_map(|(_, outcomes)| outcomes)
                    .filter(|outcome| !outcome.succeeded)
                    .max_by_key(|outcome| outcome.timestamp);

                match failure {
                    Some(outcome) => {
                        let cause = outcome.cause().unwrap_or(FailureCause::Unknown);
                        MissingExchange {
                            exchange,
                            operation: Some(outcome.operation),
                            reason: outcome.message.clone().unwrap_or_default(),
                            status: outcome.status,
                            timestamp: Some(outcome.timestamp),
                            cause: Some(cause),
                            guidance: cause.guidance(),
                        }
                    }
                    None => MissingExchange {
                        exchange,
                        operation: None,
                        reason: "asset not listed or no volume reported".to_string(),
                        status: None,
                        timestamp: None,
                        cause: None,
                        guidance: "The exchange answered but does not list this asset.",
                    },
                }
            })
            .collect()
    }
}

/// Per venue view of the [`ErrorLedger`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeSummary {
    /// Total attempts across every ledgered operation.
    pub attempts: u32,
    pub successes: usize,
    pub failures: usize,
    pub last_outcome: Option<OperationOutcome>,
    /// Cause of the most recent failure, if any.
    pub cause: Option<FailureCause>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub total_operations: usize,
    pub successful: usize,
    pub failed: usize,
    pub exchanges: IndexMap<VenueId, ExchangeSummary>,
}

impl ErrorSummary {
    /// Venues with at least one failed operation.
    pub fn failing(&self) -> impl Iterator<Item = (&VenueId, &ExchangeSummary)> {
        self.exchanges
            .iter()
            .filter(|(_, summary)| summary.failures > 0)
    }
}

/// Explanation of why an exchange is absent from a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingExchange {
    pub exchange: ExchangeId,
    pub operation: Option<Operation>,
    pub reason: String,
    pub status: Option<u16>,
    pub timestamp: Option<DateTime<Utc>>,
    pub cause: Option<FailureCause>,
    pub guidance: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binance() -> VenueId {
        VenueId::spot(ExchangeId::Binance)
    }

    #[test]
    fn test_failure_cause_classify() {
        struct TestCase {
            status: Option<u16>,
            message: &'static str,
            expected: FailureCause,
        }

        let tests = vec![
            TestCase {
                // TC0: 429 status
                status: Some(429),
                message: "",
                expected: FailureCause::RateLimit,
            },
            TestCase {
                // TC1: 403 status wins over message text
                status: Some(403),
                message: "request timeout",
                expected: FailureCause::AccessDenied,
            },
            TestCase {
                // TC2: timeout message
                status: None,
                message: "request timeout: operation timed out",
                expected: FailureCause::Timeout,
            },
            TestCase {
                // TC3: exchange level rate limit without status
                status: None,
                message: "rate limit exceeded (status None): Too many visits!",
                expected: FailureCause::RateLimit,
            },
            TestCase {
                // TC4: geo restriction text
                status: Some(451),
                message: "Service unavailable from a restricted location",
                expected: FailureCause::AccessDenied,
            },
            TestCase {
                // TC5: anything else
                status: Some(500),
                message: "Internal Server Error",
                expected: FailureCause::Unknown,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = FailureCause::classify(test.status, test.message);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_summarize() {
        let mut ledger = ErrorLedger::default();
        let okx_perp = VenueId::perpetual(ExchangeId::Okx);

        ledger.record(OperationOutcome::success(binance(), Operation::LoadMarkets, 1));
        ledger.record(OperationOutcome::failure(
            binance(),
            Operation::FetchOhlcv,
            &ApiError::from_status(429, "Too Many Requests"),
            3,
        ));
        ledger.record(OperationOutcome::success(okx_perp, Operation::FetchOhlcv, 2));

        let summary = ledger.summarize();
        assert_eq!(summary.total_operations, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);

        let binance_summary = &summary.exchanges[&binance()];
        assert_eq!(binance_summary.attempts, 4);
        assert_eq!(binance_summary.failures, 1);
        assert_eq!(binance_summary.cause, Some(FailureCause::RateLimit));
        assert_eq!(
            binance_summary
                .last_outcome
                .as_ref()
                .map(|outcome| outcome.operation),
            Some(Operation::FetchOhlcv)
        );

        assert_eq!(summary.exchanges[&okx_perp].cause, None);
        assert_eq!(summary.failing().count(), 1);

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.summarize().total_operations, 0);
    }

    #[test]
    fn test_missing_exchanges() {
        let mut ledger = ErrorLedger::default();
        ledger.record(OperationOutcome::failure(
            VenueId::perpetual(ExchangeId::Bybit),
            Operation::LoadMarkets,
            &ApiError::from_status(403, "Forbidden"),
            2,
        ));

        let present = [ExchangeId::Binance].into_iter().collect::<FnvHashSet<_>>();
        let missing = ledger.missing_exchanges(
            [ExchangeId::Binance, ExchangeId::Bybit, ExchangeId::Kraken],
            &present,
        );

        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].exchange, ExchangeId::Bybit);
        assert_eq!(missing[0].operation, Some(Operation::LoadMarkets));
        assert_eq!(missing[0].status, Some(403));
        assert_eq!(missing[0].cause, Some(FailureCause::AccessDenied));
        assert_eq!(missing[1].exchange, ExchangeId::Kraken);
        assert_eq!(missing[1].cause, None);
    }
}
