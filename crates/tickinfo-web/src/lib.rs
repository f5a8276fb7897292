//! # Tickinfo Web
//!
//! HTTP surface over [`tickinfo_core::Resolver`].
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /{stock,reit,etf}/{ticker}` | Resolve the requested fields for one ticker |
//!
//! Query parameters are described in [`query`]. A successful response is a
//! flat JSON object holding exactly the requested fields; the
//! `x-tickinfo-source` header says whether it came from the cache, fresh
//! provider data or a merge of both.

pub mod error;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tickinfo_core::{EntityKind, ResolveRequest, Resolver, Ticker};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::{ApiError, ServerError};
pub use query::ResolveQuery;

pub const SOURCE_HEADER: &str = "x-tickinfo-source";

#[derive(Clone)]
pub struct AppState {
    resolver: Arc<Resolver>,
}

/// Builds the service router around a shared resolver.
pub fn app(resolver: Arc<Resolver>) -> Router {
    Router::new()
        .route("/:kind/:ticker", get(resolve_ticker))
        .with_state(AppState { resolver })
        .layer(TraceLayer::new_for_http())
}

async fn resolve_ticker(
    State(state): State<AppState>,
    Path((kind, ticker)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let kind = kind
        .parse::<EntityKind>()
        .map_err(|_| ApiError::UnknownKind(kind))?;
    let ticker = Ticker::parse(&ticker)?;
    let query = ResolveQuery::from_params(&params);

    let request = ResolveRequest::new(ticker.clone(), kind, query.fields.clone())
        .with_strategy(query.strategy)
        .with_cache_control(query.cache);
    let resolution = state.resolver.serve(&request).await;

    let Some(record) = resolution.record else {
        warn!(
            ticker = %ticker,
            kind = %kind,
            failures = resolution.errors.len(),
            "nothing resolved"
        );
        return Err(ApiError::NotFound(ticker));
    };

    info!(
        ticker = %ticker,
        kind = %kind,
        origin = ?resolution.origin,
        latency_ms = resolution.latency_ms,
        "resolved"
    );

    let mut response = Json(record.project(&query.fields)).into_response();
    if let Some(origin) = resolution.origin {
        response
            .headers_mut()
            .insert(SOURCE_HEADER, HeaderValue::from_static(origin.as_str()));
    }
    Ok(response)
}
