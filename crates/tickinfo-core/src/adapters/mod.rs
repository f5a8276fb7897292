//! Provider adapters.
//!
//! | Adapter | Upstream | Kinds |
//! |---------|----------|-------|
//! | [`StockAnalysisAdapter`] | stockanalysis.com | stock, reit, etf |
//! | [`Investidor10Adapter`] | investidor10.com.br | stock, reit, etf |
//!
//! Both scrape public pages, so each one keeps its own circuit breaker and
//! degrades to `null` fields whenever a page changes shape.

pub mod extract;
mod investidor10;
mod stockanalysis;

pub use investidor10::Investidor10Adapter;
pub use stockanalysis::StockAnalysisAdapter;

use serde_json::Value;
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::SourceError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::ProviderId;

/// Issues one GET through the breaker and returns the body of a 2xx answer.
///
/// Only transport errors, timeouts, 5xx, 408 and 429 count against the
/// breaker. Any other answer proves the upstream is healthy: a 404 or 410 is
/// reported as `NotFound` for that ticker alone.
pub(crate) async fn download(
    provider: ProviderId,
    http_client: &dyn HttpClient,
    circuit_breaker: &CircuitBreaker,
    request: HttpRequest,
) -> Result<String, SourceError> {
    circuit_breaker.check()?;

    debug!(provider = %provider, url = %request.url, "downloading");
    let response = match http_client.execute(request).await {
        Ok(response) => response,
        Err(error) => {
            circuit_breaker.record_failure();
            let reason = if error.is_timeout() { "timeout" } else { "error" };
            return Err(SourceError::unavailable(format!(
                "{provider} transport {reason}: {}",
                error.message()
            )));
        }
    };

    if response.is_success() {
        circuit_breaker.record_success();
        return Ok(response.body);
    }

    match response.status {
        404 | 410 => {
            circuit_breaker.record_success();
            Err(SourceError::not_found(format!(
                "{provider} has no such ticker (status {})",
                response.status
            )))
        }
        status if (400..500).contains(&status) && status != 408 && status != 429 => {
            circuit_breaker.record_success();
            Err(SourceError::unavailable(format!(
                "{provider} upstream rejected the request with status {status}"
            )))
        }
        status => {
            circuit_breaker.record_failure();
            Err(SourceError::unavailable(format!(
                "{provider} upstream returned status {status}"
            )))
        }
    }
}

/// Decodes a JSON body, mapping failure to `Malformed`.
pub(crate) fn decode_json(provider: ProviderId, what: &str, body: &str) -> Result<Value, SourceError> {
    serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse {provider} {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{FixtureHttpClient, HttpError, HttpResponse};

    const URL: &str = "https://upstream.test/page";

    async fn answer(client: &FixtureHttpClient, breaker: &CircuitBreaker) -> Result<String, SourceError> {
        download(ProviderId::StockAnalysis, client, breaker, HttpRequest::get(URL)).await
    }

    #[tokio::test]
    async fn client_errors_leave_the_breaker_closed() {
        for status in [400, 403, 404, 410] {
            let client =
                FixtureHttpClient::new().with_response(URL, HttpResponse::with_status(status, ""));
            let breaker = CircuitBreaker::for_provider(ProviderId::StockAnalysis);

            for _ in 0..5 {
                let _ = answer(&client, &breaker).await;
            }

            assert_eq!(breaker.state(), CircuitState::Closed, "status {status}");
            assert_eq!(client.requested_urls().len(), 5, "status {status}");
        }
    }

    #[tokio::test]
    async fn missing_pages_are_not_found() {
        let client = FixtureHttpClient::new().with_response(URL, HttpResponse::with_status(410, ""));
        let breaker = CircuitBreaker::for_provider(ProviderId::StockAnalysis);

        let error = answer(&client, &breaker).await.expect_err("410 must fail");
        assert_eq!(error.kind(), SourceErrorKind::NotFound);
    }

    #[tokio::test]
    async fn upstream_health_failures_open_the_breaker() {
        let failing = [
            FixtureHttpClient::new().with_response(URL, HttpResponse::with_status(503, "")),
            FixtureHttpClient::new().with_response(URL, HttpResponse::with_status(429, "")),
            FixtureHttpClient::new().with_error(URL, HttpError::timed_out("slow")),
            FixtureHttpClient::new().with_error(URL, HttpError::new("reset")),
        ];

        for client in failing {
            let breaker = CircuitBreaker::for_provider(ProviderId::StockAnalysis);
            for _ in 0..3 {
                let error = answer(&client, &breaker).await.expect_err("must fail");
                assert_eq!(error.kind(), SourceErrorKind::Unavailable);
            }
            assert_eq!(breaker.state(), CircuitState::Open);
        }
    }
}
