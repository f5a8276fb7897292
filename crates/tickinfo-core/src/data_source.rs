//! Source provider trait and request/error types.
//!
//! This module defines the contract (`SourceProvider`) every upstream data
//! source implements. A provider answers a subset of the field vocabulary for
//! one ticker and either returns a partial [`Record`] or a [`SourceError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tickinfo_core::{EntityKind, FetchRequest, FieldName, FieldSet, SourceProvider, Ticker};
//!
//! async fn fetch_price(provider: &dyn SourceProvider) -> Result<(), tickinfo_core::SourceError> {
//!     let request = FetchRequest::new(
//!         Ticker::parse("AAPL")?,
//!         EntityKind::Stock,
//!         FieldSet::from([FieldName::Price]),
//!     )?;
//!     let record = provider.fetch(request).await?;
//!     println!("{:?}", record.get(FieldName::Price));
//!     Ok(())
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::{EntityKind, FieldSet, ProviderId, Record, Ticker, ValidationError};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    /// Upstream answered but has no such ticker.
    NotFound,
    Timeout,
    Malformed,
    UnsupportedKind,
    InvalidRequest,
    AdapterNotRegistered,
    Internal,
}

/// Structured provider failure. Always non-fatal to the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn timeout(provider: ProviderId, limit: Duration) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: format!(
                "source '{provider}' did not answer within {}ms",
                limit.as_millis()
            ),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Malformed,
            message: message.into(),
        }
    }

    pub fn unsupported_kind(provider: ProviderId, kind: EntityKind) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedKind,
            message: format!("source '{provider}' does not serve '{kind}' tickers"),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn adapter_not_registered(provider: ProviderId) -> Self {
        Self {
            kind: SourceErrorKind::AdapterNotRegistered,
            message: format!("source adapter '{provider}' is not registered"),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::UnsupportedKind => "source.unsupported_kind",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::AdapterNotRegistered => "source.adapter_not_registered",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_request(value.to_string())
    }
}

/// Request payload handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticker: Ticker,
    pub kind: EntityKind,
    pub fields: FieldSet,
}

impl FetchRequest {
    pub fn new(ticker: Ticker, kind: EntityKind, fields: FieldSet) -> Result<Self, SourceError> {
        if fields.is_empty() {
            return Err(SourceError::invalid_request(
                "fetch request must include at least one field",
            ));
        }
        Ok(Self {
            ticker,
            kind,
            fields,
        })
    }
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Record, SourceError>> + Send + 'a>>;

/// Upstream data source contract.
///
/// # Required Methods
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](SourceProvider::id) | Unique provider identifier |
/// | [`supports`](SourceProvider::supports) | Whether the entity kind is served |
/// | [`fetch`](SourceProvider::fetch) | Resolve the requested fields |
///
/// Implementations must be `Send + Sync`; one instance serves every request.
pub trait SourceProvider: Send + Sync {
    /// Returns the unique provider identifier.
    fn id(&self) -> ProviderId;

    /// Returns whether tickers of `kind` can be served.
    fn supports(&self, kind: EntityKind) -> bool;

    /// Resolves `req.fields` for one ticker.
    ///
    /// Fields the provider cannot determine are returned as `null`. Fields
    /// outside `req.fields` should not be computed.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport failures, non-success statuses
    /// or an upstream payload that cannot be decoded at all.
    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_request_rejects_empty_field_set() {
        let error = FetchRequest::new(
            Ticker::parse("AAPL").expect("valid"),
            EntityKind::Stock,
            FieldSet::new(),
        )
        .expect_err("empty field set must fail");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    }

    #[test]
    fn error_display_includes_code() {
        let error = SourceError::timeout(ProviderId::Investidor10, Duration::from_millis(250));
        assert_eq!(
            error.to_string(),
            "source 'investidor10' did not answer within 250ms (source.timeout)"
        );
    }
}
