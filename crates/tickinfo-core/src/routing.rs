//! Ordered fallback across source providers with field-level merging.
//!
//! The router walks the chain for an entity kind one provider at a time. Each
//! provider after the first is asked only for the fields still unresolved,
//! and its answer may only fill those fields.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::adapters::{Investidor10Adapter, StockAnalysisAdapter};
use crate::data_source::{FetchRequest, SourceError, SourceProvider};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::missing::missing_fields;
use crate::{EntityKind, FieldSet, ProviderId, Record, Ticker};

/// Upper bound for a single provider call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Source selection strategy for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStrategy {
    /// Configured chain for the entity kind.
    Auto,
    /// Explicit order; duplicates are dropped.
    Priority(Vec<ProviderId>),
    /// One pinned provider, no fallback.
    Strict(ProviderId),
}

impl SourceStrategy {
    fn is_strict(&self) -> bool {
        matches!(self, Self::Strict(_))
    }

    /// Maps the `source` request parameter: a provider name pins it, anything
    /// else (including `all`) uses the configured chain.
    pub fn from_source_param(value: &str) -> Self {
        let normalized = value.replace(' ', "");
        normalized
            .parse::<ProviderId>()
            .map_or(Self::Auto, Self::Strict)
    }
}

impl Default for SourceStrategy {
    fn default() -> Self {
        Self::Auto
    }
}

/// Provider priority per entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChains {
    stock: Vec<ProviderId>,
    reit: Vec<ProviderId>,
    etf: Vec<ProviderId>,
}

impl Default for FallbackChains {
    fn default() -> Self {
        let chain = vec![ProviderId::StockAnalysis, ProviderId::Investidor10];
        Self {
            stock: chain.clone(),
            reit: chain.clone(),
            etf: chain,
        }
    }
}

impl FallbackChains {
    pub fn for_kind(&self, kind: EntityKind) -> &[ProviderId] {
        match kind {
            EntityKind::Stock => &self.stock,
            EntityKind::Reit => &self.reit,
            EntityKind::Etf => &self.etf,
        }
    }

    pub fn with_chain(mut self, kind: EntityKind, chain: Vec<ProviderId>) -> Self {
        let chain = dedupe_chain(&chain);
        match kind {
            EntityKind::Stock => self.stock = chain,
            EntityKind::Reit => self.reit = chain,
            EntityKind::Etf => self.etf = chain,
        }
        self
    }
}

/// A provider that contributed nothing, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub error: SourceError,
}

/// Merged answer from one or more providers.
#[derive(Debug, Clone)]
pub struct MergeSuccess {
    pub record: Record,
    /// Requested fields still absent or null after the whole chain.
    pub unresolved: FieldSet,
    pub contributors: Vec<ProviderId>,
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<ProviderFailure>,
    pub latency_ms: u64,
}

/// Every candidate failed; nothing was obtained.
#[derive(Debug, Clone)]
pub struct MergeFailure {
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    pub errors: Vec<ProviderFailure>,
    pub latency_ms: u64,
}

pub type MergeResult = Result<MergeSuccess, MergeFailure>;

/// Adapter registry and fallback merge engine.
pub struct SourceRouter {
    adapters: HashMap<ProviderId, Arc<dyn SourceProvider>>,
    chains: FallbackChains,
    call_timeout: Duration,
}

impl Default for SourceRouter {
    fn default() -> Self {
        SourceRouterBuilder::new().build()
    }
}

/// Builder for a [`SourceRouter`] wired to the bundled adapters.
///
/// # Example
///
/// ```rust,ignore
/// use tickinfo_core::{SourceRouterBuilder, ServiceConfig};
///
/// let config = ServiceConfig::from_env();
/// let router = SourceRouterBuilder::new()
///     .with_chains(config.chains.clone())
///     .with_call_timeout(config.provider_timeout)
///     .build();
/// ```
pub struct SourceRouterBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    chains: FallbackChains,
    call_timeout: Duration,
    enable_stockanalysis: bool,
    enable_investidor10: bool,
}

impl Default for SourceRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRouterBuilder {
    /// Create a new builder with both adapters enabled.
    pub fn new() -> Self {
        Self {
            http_client: None,
            chains: FallbackChains::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            enable_stockanalysis: true,
            enable_investidor10: true,
        }
    }

    /// Share one transport between adapters (defaults to reqwest).
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_chains(mut self, chains: FallbackChains) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Enable or disable the StockAnalysis adapter.
    pub fn with_stockanalysis_enabled(mut self, enabled: bool) -> Self {
        self.enable_stockanalysis = enabled;
        self
    }

    /// Enable or disable the Investidor10 adapter.
    pub fn with_investidor10_enabled(mut self, enabled: bool) -> Self {
        self.enable_investidor10 = enabled;
        self
    }

    pub fn build(self) -> SourceRouter {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let mut adapters: Vec<Arc<dyn SourceProvider>> = Vec::new();

        if self.enable_stockanalysis {
            adapters.push(Arc::new(StockAnalysisAdapter::with_http_client(Arc::clone(
                &http_client,
            ))));
        }
        if self.enable_investidor10 {
            adapters.push(Arc::new(Investidor10Adapter::with_http_client(Arc::clone(
                &http_client,
            ))));
        }

        SourceRouter::new(adapters)
            .with_chains(self.chains)
            .with_call_timeout(self.call_timeout)
    }
}

impl SourceRouter {
    pub fn new(adapters: Vec<Arc<dyn SourceProvider>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();
        Self {
            adapters,
            chains: FallbackChains::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_chains(mut self, chains: FallbackChains) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Providers that would be tried, in order.
    pub fn source_chain_for(&self, kind: EntityKind, strategy: &SourceStrategy) -> Vec<ProviderId> {
        match strategy {
            SourceStrategy::Auto => self.chains.for_kind(kind).to_vec(),
            SourceStrategy::Priority(priority) => dedupe_chain(priority),
            SourceStrategy::Strict(provider) => vec![*provider],
        }
    }

    /// Resolve `requested` for one ticker, narrowing the field set after every
    /// successful answer. Providers are called sequentially and each call is
    /// bounded by the router's call timeout.
    pub async fn route_fields(
        &self,
        ticker: &Ticker,
        kind: EntityKind,
        requested: &FieldSet,
        strategy: &SourceStrategy,
    ) -> MergeResult {
        let started = Instant::now();
        let planned_chain = self.source_chain_for(kind, strategy);
        let mut source_chain = Vec::with_capacity(planned_chain.len());
        let mut contributors = Vec::new();
        let mut errors = Vec::new();
        let mut merged: Option<Record> = None;
        let mut pending = requested.clone();

        if requested.is_empty() {
            return Ok(MergeSuccess {
                record: Record::new(),
                unresolved: FieldSet::new(),
                contributors,
                source_chain,
                warnings: Vec::new(),
                errors,
                latency_ms: elapsed_ms(started),
            });
        }

        for provider in planned_chain {
            if pending.is_empty() {
                break;
            }
            source_chain.push(provider);

            match self.invoke(provider, ticker, kind, &pending).await {
                Ok(partial) => {
                    let record = merged.get_or_insert_with(Record::new);
                    record.fill_from(&partial, &pending);
                    contributors.push(provider);
                    pending = missing_fields(Some(record), requested);
                    debug!(
                        provider = %provider,
                        ticker = %ticker,
                        remaining = pending.len(),
                        "source answered"
                    );
                }
                Err(error) => {
                    warn!(provider = %provider, ticker = %ticker, %error, "source failed");
                    errors.push(ProviderFailure { provider, error });
                }
            }

            if strategy.is_strict() {
                break;
            }
        }

        let latency_ms = elapsed_ms(started);
        match merged {
            Some(record) => {
                let mut warnings = Vec::new();
                if !errors.is_empty() {
                    warnings.push(format!(
                        "source fallback succeeded after {} failed attempt(s)",
                        errors.len()
                    ));
                }
                if !pending.is_empty() {
                    warnings.push(format!(
                        "{} field(s) unresolved after exhausting sources: {pending}",
                        pending.len()
                    ));
                }

                Ok(MergeSuccess {
                    record,
                    unresolved: pending,
                    contributors,
                    source_chain,
                    warnings,
                    errors,
                    latency_ms,
                })
            }
            None => {
                let warning = if source_chain.is_empty() {
                    format!("no source candidates available for '{kind}' tickers")
                } else {
                    format!("all sources failed for ticker '{ticker}'")
                };
                Err(MergeFailure {
                    source_chain,
                    warnings: vec![warning],
                    errors,
                    latency_ms,
                })
            }
        }
    }

    async fn invoke(
        &self,
        provider: ProviderId,
        ticker: &Ticker,
        kind: EntityKind,
        fields: &FieldSet,
    ) -> Result<Record, SourceError> {
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or_else(|| SourceError::adapter_not_registered(provider))?;
        if !adapter.supports(kind) {
            return Err(SourceError::unsupported_kind(provider, kind));
        }

        let request = FetchRequest::new(ticker.clone(), kind, fields.clone())?;
        debug!(provider = %provider, ticker = %ticker, fields = %fields, "querying source");

        tokio::time::timeout(self.call_timeout, adapter.fetch(request))
            .await
            .map_err(|_| SourceError::timeout(provider, self.call_timeout))?
    }
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    let mut output = Vec::with_capacity(chain.len());

    for provider in chain {
        if seen.insert(*provider) {
            output.push(*provider);
        }
    }

    output
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{FetchFuture, SourceErrorKind};
    use crate::{FieldName, FieldValue};
    use std::sync::Mutex;

    /// Provider returning a fixed answer and recording every requested field set.
    struct ScriptedProvider {
        id: ProviderId,
        answer: Result<Record, SourceError>,
        delay: Option<Duration>,
        kinds: Vec<EntityKind>,
        calls: Mutex<Vec<FieldSet>>,
    }

    impl ScriptedProvider {
        fn answering(id: ProviderId, entries: &[(FieldName, FieldValue)]) -> Arc<Self> {
            Arc::new(Self {
                id,
                answer: Ok(entries.iter().cloned().collect()),
                delay: None,
                kinds: EntityKind::ALL.to_vec(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(id: ProviderId) -> Arc<Self> {
            Arc::new(Self {
                id,
                answer: Err(SourceError::unavailable("upstream returned status 503")),
                delay: None,
                kinds: EntityKind::ALL.to_vec(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<FieldSet> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl SourceProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn supports(&self, kind: EntityKind) -> bool {
            self.kinds.contains(&kind)
        }

        fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a> {
            Box::pin(async move {
                self.calls.lock().expect("calls lock").push(req.fields.clone());
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.answer.clone()
            })
        }
    }

    fn aapl() -> Ticker {
        Ticker::parse("AAPL").expect("valid ticker")
    }

    fn router(first: Arc<ScriptedProvider>, second: Arc<ScriptedProvider>) -> SourceRouter {
        SourceRouter::new(vec![first as Arc<dyn SourceProvider>, second])
    }

    #[tokio::test]
    async fn first_source_satisfying_everything_short_circuits() {
        let primary = ScriptedProvider::answering(
            ProviderId::StockAnalysis,
            &[
                (FieldName::Price, FieldValue::Number(10.0)),
                (FieldName::Sector, FieldValue::text("Tech")),
            ],
        );
        let secondary = ScriptedProvider::failing(ProviderId::Investidor10);
        let router = router(Arc::clone(&primary), Arc::clone(&secondary));
        let requested = FieldSet::from([FieldName::Price, FieldName::Sector]);

        let success = router
            .route_fields(&aapl(), EntityKind::Stock, &requested, &SourceStrategy::Auto)
            .await
            .expect("route should succeed");

        assert_eq!(success.contributors, vec![ProviderId::StockAnalysis]);
        assert_eq!(success.source_chain, vec![ProviderId::StockAnalysis]);
        assert!(secondary.calls().is_empty());
        assert!(success.unresolved.is_empty());
    }

    #[tokio::test]
    async fn later_sources_only_receive_missing_fields() {
        let primary = ScriptedProvider::answering(
            ProviderId::StockAnalysis,
            &[
                (FieldName::Price, FieldValue::Number(10.0)),
                (FieldName::Sector, FieldValue::Null),
            ],
        );
        let secondary = ScriptedProvider::answering(
            ProviderId::Investidor10,
            &[
                (FieldName::Price, FieldValue::Number(99.0)),
                (FieldName::Sector, FieldValue::text("Tech")),
                (FieldName::Dy, FieldValue::Number(0.5)),
            ],
        );
        let router = router(Arc::clone(&primary), Arc::clone(&secondary));
        let requested = FieldSet::from([FieldName::Price, FieldName::Sector, FieldName::Dy]);

        let success = router
            .route_fields(&aapl(), EntityKind::Stock, &requested, &SourceStrategy::Auto)
            .await
            .expect("route should succeed");

        assert_eq!(secondary.calls(), vec![FieldSet::from([FieldName::Sector, FieldName::Dy])]);
        assert_eq!(
            success.record.get(FieldName::Price),
            Some(&FieldValue::Number(10.0)),
            "resolved field must not be overwritten"
        );
        assert_eq!(success.record.get(FieldName::Sector), Some(&FieldValue::text("Tech")));
        assert_eq!(success.record.get(FieldName::Dy), Some(&FieldValue::Number(0.5)));
        assert_eq!(
            success.contributors,
            vec![ProviderId::StockAnalysis, ProviderId::Investidor10]
        );
    }

    #[tokio::test]
    async fn failed_primary_hands_full_request_to_next_source() {
        let primary = ScriptedProvider::failing(ProviderId::StockAnalysis);
        let secondary = ScriptedProvider::answering(
            ProviderId::Investidor10,
            &[(FieldName::Price, FieldValue::Number(7.0))],
        );
        let router = router(Arc::clone(&primary), Arc::clone(&secondary));
        let requested = FieldSet::from([FieldName::Price, FieldName::Roe]);

        let success = router
            .route_fields(&aapl(), EntityKind::Reit, &requested, &SourceStrategy::Auto)
            .await
            .expect("route should succeed with fallback");

        assert_eq!(secondary.calls(), vec![requested.clone()]);
        assert_eq!(success.errors.len(), 1);
        assert_eq!(success.errors[0].provider, ProviderId::StockAnalysis);
        assert_eq!(success.unresolved, FieldSet::from([FieldName::Roe]));
        assert!(success.record.get(FieldName::Roe).is_none());
    }

    #[tokio::test]
    async fn all_sources_failing_is_absence_not_empty_record() {
        let router = router(
            ScriptedProvider::failing(ProviderId::StockAnalysis),
            ScriptedProvider::failing(ProviderId::Investidor10),
        );
        let requested = FieldSet::from([FieldName::Price]);

        let failure = router
            .route_fields(&aapl(), EntityKind::Stock, &requested, &SourceStrategy::Auto)
            .await
            .expect_err("every source failed");

        assert_eq!(
            failure.source_chain,
            vec![ProviderId::StockAnalysis, ProviderId::Investidor10]
        );
        assert_eq!(failure.errors.len(), 2);
    }

    #[tokio::test]
    async fn strict_source_does_not_fallback() {
        let primary = ScriptedProvider::failing(ProviderId::StockAnalysis);
        let secondary = ScriptedProvider::answering(
            ProviderId::Investidor10,
            &[(FieldName::Price, FieldValue::Number(7.0))],
        );
        let router = router(Arc::clone(&primary), Arc::clone(&secondary));

        let failure = router
            .route_fields(
                &aapl(),
                EntityKind::Stock,
                &FieldSet::from([FieldName::Price]),
                &SourceStrategy::Strict(ProviderId::StockAnalysis),
            )
            .await
            .expect_err("strict route should fail");

        assert_eq!(failure.source_chain, vec![ProviderId::StockAnalysis]);
        assert!(secondary.calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_kind_and_unregistered_sources_are_skipped() {
        let etf_blind = Arc::new(ScriptedProvider {
            id: ProviderId::StockAnalysis,
            answer: Ok(Record::new()),
            delay: None,
            kinds: vec![EntityKind::Stock],
            calls: Mutex::new(Vec::new()),
        });
        let router = SourceRouter::new(vec![Arc::clone(&etf_blind) as Arc<dyn SourceProvider>]);

        let failure = router
            .route_fields(
                &aapl(),
                EntityKind::Etf,
                &FieldSet::from([FieldName::Price]),
                &SourceStrategy::Auto,
            )
            .await
            .expect_err("no usable source");

        assert!(etf_blind.calls().is_empty());
        let kinds: Vec<_> = failure.errors.iter().map(|f| f.error.kind()).collect();
        assert_eq!(
            kinds,
            vec![SourceErrorKind::UnsupportedKind, SourceErrorKind::AdapterNotRegistered]
        );
    }

    #[tokio::test]
    async fn slow_source_times_out_and_chain_continues() {
        let slow = Arc::new(ScriptedProvider {
            id: ProviderId::StockAnalysis,
            answer: Ok([(FieldName::Price, FieldValue::Number(1.0))].into_iter().collect()),
            delay: Some(Duration::from_millis(500)),
            kinds: EntityKind::ALL.to_vec(),
            calls: Mutex::new(Vec::new()),
        });
        let fast = ScriptedProvider::answering(
            ProviderId::Investidor10,
            &[(FieldName::Price, FieldValue::Number(2.0))],
        );
        let router = router(slow, fast).with_call_timeout(Duration::from_millis(20));

        let success = router
            .route_fields(
                &aapl(),
                EntityKind::Stock,
                &FieldSet::from([FieldName::Price]),
                &SourceStrategy::Auto,
            )
            .await
            .expect("fallback should succeed");

        assert_eq!(success.record.get(FieldName::Price), Some(&FieldValue::Number(2.0)));
        assert_eq!(success.errors[0].error.kind(), SourceErrorKind::Timeout);
    }

    #[test]
    fn priority_chain_is_deduplicated() {
        let router = SourceRouter::new(Vec::new());
        let chain = router.source_chain_for(
            EntityKind::Stock,
            &SourceStrategy::Priority(vec![
                ProviderId::Investidor10,
                ProviderId::StockAnalysis,
                ProviderId::Investidor10,
            ]),
        );
        assert_eq!(chain, vec![ProviderId::Investidor10, ProviderId::StockAnalysis]);
    }

    #[test]
    fn source_param_maps_to_strategy() {
        assert_eq!(SourceStrategy::from_source_param("all"), SourceStrategy::Auto);
        assert_eq!(SourceStrategy::from_source_param("bogus"), SourceStrategy::Auto);
        assert_eq!(
            SourceStrategy::from_source_param("Stock Analysis"),
            SourceStrategy::Strict(ProviderId::StockAnalysis)
        );
    }
}
