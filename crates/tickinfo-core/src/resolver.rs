//! Request-level orchestration: cache lookup, fallback fetch, merge, persist.
//!
//! [`Resolver::resolve`] decides what to fetch and what to return;
//! [`Resolver::serve`] wraps it with the cache-control flags of a request and
//! writes newly obtained data back to the cache.

use std::fmt::{Display, Formatter};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::ServiceConfig;
use crate::missing::missing_fields;
use crate::routing::{ProviderFailure, SourceRouter, SourceRouterBuilder, SourceStrategy};
use crate::{EntityKind, FieldSet, ProviderId, Record, Ticker};

/// Where the returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOrigin {
    /// Every requested field was already cached.
    Cache,
    /// Nothing usable was cached; providers answered.
    Fresh,
    /// Cached fields completed by providers.
    Merged,
}

impl ResolutionOrigin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Fresh => "fresh",
            Self::Merged => "merged",
        }
    }
}

impl Display for ResolutionOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request cache switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheControl {
    pub use_cache: bool,
    /// Drop this ticker's entry before resolving.
    pub clear_cached_data: bool,
    /// Drop the whole store before resolving.
    pub delete_all_cache: bool,
}

impl Default for CacheControl {
    fn default() -> Self {
        Self {
            use_cache: true,
            clear_cached_data: false,
            delete_all_cache: false,
        }
    }
}

impl CacheControl {
    /// Invalidating flags also bypass the cache for the current call.
    pub const fn cache_enabled(&self) -> bool {
        self.use_cache && !self.clear_cached_data && !self.delete_all_cache
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub ticker: Ticker,
    pub kind: EntityKind,
    pub fields: FieldSet,
    pub strategy: SourceStrategy,
    pub cache: CacheControl,
}

impl ResolveRequest {
    pub fn new(ticker: Ticker, kind: EntityKind, fields: FieldSet) -> Self {
        Self {
            ticker,
            kind,
            fields,
            strategy: SourceStrategy::Auto,
            cache: CacheControl::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SourceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cache_control(mut self, cache: CacheControl) -> Self {
        self.cache = cache;
        self
    }
}

/// Outcome of one resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// `None` when neither the cache nor any provider had data.
    pub record: Option<Record>,
    /// New data was obtained and belongs in the cache.
    pub should_persist: bool,
    /// Only the fields fetched by this call, limited to what was missing.
    pub fetched: Record,
    pub origin: Option<ResolutionOrigin>,
    pub source_chain: Vec<ProviderId>,
    pub contributors: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<ProviderFailure>,
    pub latency_ms: u64,
}

impl Resolution {
    fn from_cache(record: Record, started: Instant) -> Self {
        Self {
            record: Some(record),
            should_persist: false,
            fetched: Record::new(),
            origin: Some(ResolutionOrigin::Cache),
            source_chain: Vec::new(),
            contributors: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: elapsed_ms(started),
        }
    }

    pub fn is_found(&self) -> bool {
        self.record.is_some()
    }
}

/// Cache-aware field resolver.
pub struct Resolver {
    cache: CacheStore,
    router: SourceRouter,
}

impl Resolver {
    pub fn new(cache: CacheStore, router: SourceRouter) -> Self {
        Self { cache, router }
    }

    /// Resolver backed by the bundled adapters, configured from `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let cache = CacheStore::new(config.cache_path.clone(), config.cache_ttl);
        let router = SourceRouterBuilder::new()
            .with_chains(config.chains.clone())
            .with_call_timeout(config.provider_timeout)
            .build();
        Self::new(cache, router)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn router(&self) -> &SourceRouter {
        &self.router
    }

    /// Resolves `requested` for one ticker without writing to the cache.
    ///
    /// An empty `requested` means the whole vocabulary. With the cache
    /// enabled only the fields the cached record does not resolve are fetched,
    /// and the result says whether new data should be persisted.
    pub async fn resolve(
        &self,
        ticker: &Ticker,
        kind: EntityKind,
        requested: &FieldSet,
        strategy: &SourceStrategy,
        cache_enabled: bool,
    ) -> Resolution {
        let started = Instant::now();
        let requested = if requested.is_empty() {
            FieldSet::all()
        } else {
            requested.clone()
        };

        let cached = if cache_enabled {
            match self.cache.read(ticker).await {
                Ok(cached) => cached,
                Err(error) => {
                    warn!(ticker = %ticker, %error, "cache read failed; treating as miss");
                    None
                }
            }
        } else {
            None
        };

        let missing = missing_fields(cached.as_ref(), &requested);
        if let Some(record) = cached.as_ref().filter(|_| missing.is_empty()) {
            debug!(ticker = %ticker, fields = requested.len(), "served from cache");
            return Resolution::from_cache(record.clone(), started);
        }

        debug!(
            ticker = %ticker,
            kind = %kind,
            cached = cached.is_some(),
            missing = %missing,
            "fetching missing fields"
        );
        let outcome = self.router.route_fields(ticker, kind, &missing, strategy).await;

        let fetched = outcome
            .as_ref()
            .map(|fresh| fresh.record.project(&missing))
            .unwrap_or_default();

        let (record, should_persist, origin, source_chain, contributors, warnings, errors) =
            match (cached, outcome) {
                (Some(mut cached), Ok(fresh)) => {
                    cached.fill_from(&fetched, &missing);
                    (
                        Some(cached),
                        cache_enabled,
                        Some(ResolutionOrigin::Merged),
                        fresh.source_chain,
                        fresh.contributors,
                        fresh.warnings,
                        fresh.errors,
                    )
                }
                (Some(cached), Err(failure)) => (
                    Some(cached),
                    false,
                    Some(ResolutionOrigin::Cache),
                    failure.source_chain,
                    Vec::new(),
                    failure.warnings,
                    failure.errors,
                ),
                (None, Ok(fresh)) => (
                    Some(fresh.record),
                    cache_enabled,
                    Some(ResolutionOrigin::Fresh),
                    fresh.source_chain,
                    fresh.contributors,
                    fresh.warnings,
                    fresh.errors,
                ),
                (None, Err(failure)) => (
                    None,
                    false,
                    None,
                    failure.source_chain,
                    Vec::new(),
                    failure.warnings,
                    failure.errors,
                ),
            };

        Resolution {
            record,
            should_persist,
            fetched,
            origin,
            source_chain,
            contributors,
            warnings,
            errors,
            latency_ms: elapsed_ms(started),
        }
    }

    /// Applies the request's cache flags, resolves, and persists new data.
    ///
    /// Only the freshly fetched fields are written back, so a value another
    /// request stored meanwhile is not replaced by this request's stale view.
    /// Cache maintenance failures are logged and never fail the request.
    pub async fn serve(&self, request: &ResolveRequest) -> Resolution {
        if request.cache.delete_all_cache {
            if let Err(error) = self.cache.delete_all().await {
                warn!(%error, "failed to delete cache store");
            }
        } else if request.cache.clear_cached_data {
            if let Err(error) = self.cache.clear(&request.ticker).await {
                warn!(ticker = %request.ticker, %error, "failed to clear cache entry");
            }
        }

        let resolution = self
            .resolve(
                &request.ticker,
                request.kind,
                &request.fields,
                &request.strategy,
                request.cache.cache_enabled(),
            )
            .await;

        if resolution.should_persist && !resolution.fetched.is_empty() {
            match self.cache.upsert(&request.ticker, &resolution.fetched).await {
                Ok(created_at) => {
                    debug!(ticker = %request.ticker, %created_at, "cache entry updated");
                }
                Err(error) => {
                    warn!(ticker = %request.ticker, %error, "failed to persist resolved fields");
                }
            }
        }

        resolution
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
