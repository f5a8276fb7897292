//! # Tickinfo Core
//!
//! Field-level resolution and caching engine for ticker financial metrics.
//!
//! ## Overview
//!
//! A caller asks for a set of metrics (price, dividend yield, sector, ...)
//! for one ticker. The engine:
//!
//! - reads what is already cached for the ticker,
//! - computes which requested fields are still unknown,
//! - asks the providers of the fallback chain for just those fields,
//! - merges cached and fresh values without overwriting known data,
//! - writes the new data back with a whole-entity time-to-live.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | StockAnalysis and Investidor10 scrapers |
//! | [`cache`] | File-backed cache store with TTL |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`config`] | Environment configuration |
//! | [`data_source`] | Source provider trait and request/error types |
//! | [`domain`] | Ticker, field vocabulary, record model, timestamps |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`missing`] | Missing-field calculation |
//! | [`resolver`] | Request orchestration |
//! | [`routing`] | Fallback merge engine |
//! | [`source`] | Provider identifiers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickinfo_core::{
//!     EntityKind, FieldName, FieldSet, ResolveRequest, Resolver, ServiceConfig, Ticker,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::from_config(&ServiceConfig::from_env());
//!     let request = ResolveRequest::new(
//!         Ticker::parse("AAPL")?,
//!         EntityKind::Stock,
//!         FieldSet::from([FieldName::Price, FieldName::Dy]),
//!     );
//!
//!     let resolution = resolver.serve(&request).await;
//!     if let Some(record) = resolution.record {
//!         println!("{}", serde_json::to_string(&record)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │    Resolver     │────▶│   Cache Store    │
//! └────────┬────────┘     └──────────────────┘
//!          │ missing fields only
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Source Router  │────▶│ Circuit Breaker  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Source Provider │────▶│ HTTP Client      │
//! │ (Adapter Trait) │     │ (reqwest/fixture)│
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod missing;
pub mod resolver;
pub mod routing;
pub mod source;

// Adapter implementations
pub use adapters::{Investidor10Adapter, StockAnalysisAdapter};

// Caching
pub use cache::{CacheEntry, CacheStore, DEFAULT_CACHE_TTL};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::ServiceConfig;

// Data source trait and types
pub use data_source::{FetchFuture, FetchRequest, SourceError, SourceErrorKind, SourceProvider};

// Domain models
pub use domain::{EntityKind, FieldName, FieldSet, FieldValue, Record, Ticker, UtcDateTime};

// Error types
pub use error::{CacheError, CoreError, ValidationError};

// HTTP client types
pub use http_client::{
    FixtureHttpClient, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};

pub use missing::missing_fields;

// Orchestration
pub use resolver::{CacheControl, Resolution, ResolutionOrigin, ResolveRequest, Resolver};

// Routing types
pub use routing::{
    FallbackChains, MergeFailure, MergeResult, MergeSuccess, ProviderFailure, SourceRouter,
    SourceRouterBuilder, SourceStrategy,
};

// Source identifiers
pub use source::ProviderId;
