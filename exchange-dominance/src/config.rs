use crate::{
    exchange::catalog::DEFAULT_TIMEOUT,
    normalise::DEFAULT_KRW_PER_USD,
    retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy},
};
use std::time::Duration;

/// Environment variable overriding [`AnalyzerConfig::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "DOMINANCE_MAX_ATTEMPTS";

/// Environment variable overriding [`AnalyzerConfig::base_delay`], in milliseconds.
pub const ENV_BASE_DELAY_MS: &str = "DOMINANCE_BASE_DELAY_MS";

/// Environment variable overriding [`AnalyzerConfig::krw_per_usd`].
pub const ENV_KRW_PER_USD: &str = "DOMINANCE_KRW_PER_USD";

/// Environment variable forcing constrained network mode on (`1/true/yes`) or off (`0/false/no`).
pub const ENV_CONSTRAINED_NETWORK: &str = "DOMINANCE_CONSTRAINED_NETWORK";

/// Variables set by hosted / sandboxed environments with shared outbound IPs.
pub const CONSTRAINED_NETWORK_MARKERS: [&str; 5] = [
    "STREAMLIT_SERVER_PORT",
    "KUBERNETES_SERVICE_HOST",
    "AWS_LAMBDA_FUNCTION_NAME",
    "K_SERVICE",
    "DYNO",
];

/// Configuration of a [`VolumeAnalyzer`](crate::VolumeAnalyzer).
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Maximum attempts of each upstream call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Fixed KRW per USD conversion rate.
    pub krw_per_usd: f64,
    /// Widen the retry schedule for constrained networks.
    pub constrained_network: bool,
    /// Per request timeout of the fallback endpoints.
    pub fallback_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            krw_per_usd: DEFAULT_KRW_PER_USD,
            constrained_network: false,
            fallback_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl AnalyzerConfig {
    /// Read the configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_attempts = lookup(ENV_MAX_ATTEMPTS)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|attempts| *attempts > 0)
            .unwrap_or(defaults.max_attempts);

        let base_delay = lookup(ENV_BASE_DELAY_MS)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);

        let krw_per_usd = lookup(ENV_KRW_PER_USD)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .unwrap_or(defaults.krw_per_usd);

        let constrained_network = lookup(ENV_CONSTRAINED_NETWORK)
            .and_then(|value| parse_flag(&value))
            .unwrap_or_else(|| {
                CONSTRAINED_NETWORK_MARKERS
                    .iter()
                    .any(|marker| lookup(*marker).is_some())
            });

        Self {
            max_attempts,
            base_delay,
            krw_per_usd,
            constrained_network,
            ..defaults
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_krw_per_usd(mut self, krw_per_usd: f64) -> Self {
        self.krw_per_usd = krw_per_usd;
        self
    }

    pub fn with_constrained_network(mut self, constrained_network: bool) -> Self {
        self.constrained_network = constrained_network;
        self
    }

    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// [`RetryPolicy`] derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(self.base_delay);

        if self.constrained_network {
            policy.constrained()
        } else {
            policy
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
