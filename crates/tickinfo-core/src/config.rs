//! Service configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TICKINFO_CACHE_PATH` | `<tmp>/tickinfo/cache.jsonl` |
//! | `TICKINFO_CACHE_TTL_SECS` | `86400` |
//! | `TICKINFO_PROVIDER_TIMEOUT_MS` | `10000` |
//! | `TICKINFO_CHAIN_STOCK` / `_REIT` / `_ETF` | `stockanalysis,investidor10` |
//!
//! Invalid values are reported with `warn!` and replaced by the default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::routing::{FallbackChains, DEFAULT_CALL_TIMEOUT};
use crate::{EntityKind, ProviderId};

pub const CACHE_PATH_VAR: &str = "TICKINFO_CACHE_PATH";
pub const CACHE_TTL_VAR: &str = "TICKINFO_CACHE_TTL_SECS";
pub const PROVIDER_TIMEOUT_VAR: &str = "TICKINFO_PROVIDER_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub cache_path: PathBuf,
    pub cache_ttl: Duration,
    pub provider_timeout: Duration,
    pub chains: FallbackChains,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            cache_ttl: DEFAULT_CACHE_TTL,
            provider_timeout: DEFAULT_CALL_TIMEOUT,
            chains: FallbackChains::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let cache_path = read(CACHE_PATH_VAR).map_or(defaults.cache_path, PathBuf::from);

        let cache_ttl = read(CACHE_TTL_VAR)
            .and_then(|raw| parse_positive(CACHE_TTL_VAR, &raw))
            .map_or(defaults.cache_ttl, Duration::from_secs);

        let provider_timeout = read(PROVIDER_TIMEOUT_VAR)
            .and_then(|raw| parse_positive(PROVIDER_TIMEOUT_VAR, &raw))
            .map_or(defaults.provider_timeout, Duration::from_millis);

        let mut chains = defaults.chains;
        for kind in EntityKind::ALL {
            let key = chain_var(kind);
            if let Some(chain) = read(&key).and_then(|raw| parse_chain(&key, &raw)) {
                chains = chains.with_chain(kind, chain);
            }
        }

        Self {
            cache_path,
            cache_ttl,
            provider_timeout,
            chains,
        }
    }
}

pub fn chain_var(kind: EntityKind) -> String {
    format!("TICKINFO_CHAIN_{}", kind.label())
}

fn default_cache_path() -> PathBuf {
    env::temp_dir().join("tickinfo").join("cache.jsonl")
}

fn parse_positive(key: &str, raw: &str) -> Option<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(variable = key, value = raw, "expected a positive integer; using default");
            None
        }
    }
}

fn parse_chain(key: &str, raw: &str) -> Option<Vec<ProviderId>> {
    let parsed: Result<Vec<ProviderId>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse::<ProviderId>)
        .collect();

    match parsed {
        Ok(chain) if !chain.is_empty() => Some(chain),
        Ok(_) => {
            warn!(variable = key, "empty provider chain; using default");
            None
        }
        Err(error) => {
            warn!(variable = key, %error, "invalid provider chain; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(config(&[]), ServiceConfig::default());
        assert_eq!(ServiceConfig::default().cache_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn valid_values_override_defaults() {
        let config = config(&[
            (CACHE_PATH_VAR, "/var/lib/tickinfo/cache.jsonl"),
            (CACHE_TTL_VAR, "60"),
            (PROVIDER_TIMEOUT_VAR, "250"),
            ("TICKINFO_CHAIN_ETF", "investidor10"),
        ]);

        assert_eq!(config.cache_path, PathBuf::from("/var/lib/tickinfo/cache.jsonl"));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.provider_timeout, Duration::from_millis(250));
        assert_eq!(config.chains.for_kind(EntityKind::Etf), &[ProviderId::Investidor10]);
        assert_eq!(
            config.chains.for_kind(EntityKind::Stock),
            &[ProviderId::StockAnalysis, ProviderId::Investidor10]
        );
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config(&[
            (CACHE_TTL_VAR, "-5"),
            (PROVIDER_TIMEOUT_VAR, "0"),
            ("TICKINFO_CHAIN_REIT", "stockanalysis,yahoo"),
        ]);
        let defaults = ServiceConfig::default();

        assert_eq!(config.cache_ttl, defaults.cache_ttl);
        assert_eq!(config.provider_timeout, defaults.provider_timeout);
        assert_eq!(
            config.chains.for_kind(EntityKind::Reit),
            defaults.chains.for_kind(EntityKind::Reit)
        );
    }
}
