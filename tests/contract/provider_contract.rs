use std::sync::Arc;

use tickinfo_core::{
    EntityKind, FetchRequest, FieldName, FieldSet, FixtureHttpClient, HttpResponse,
    Investidor10Adapter, ProviderId, SourceErrorKind, SourceProvider, StockAnalysisAdapter, Ticker,
};

struct ProviderCase {
    id: ProviderId,
    source: Arc<dyn SourceProvider>,
    client: Arc<FixtureHttpClient>,
}

fn case(id: ProviderId, client: FixtureHttpClient) -> ProviderCase {
    let client = Arc::new(client);
    let source: Arc<dyn SourceProvider> = match id {
        ProviderId::StockAnalysis => Arc::new(StockAnalysisAdapter::with_http_client(client.clone())),
        ProviderId::Investidor10 => Arc::new(Investidor10Adapter::with_http_client(client.clone())),
    };
    ProviderCase { id, source, client }
}

fn unreachable_cases() -> Vec<ProviderCase> {
    vec![
        case(ProviderId::StockAnalysis, FixtureHttpClient::new()),
        case(ProviderId::Investidor10, FixtureHttpClient::new()),
    ]
}

fn stock_url(id: ProviderId, ticker: &Ticker) -> String {
    match id {
        ProviderId::StockAnalysis => StockAnalysisAdapter::overview_url(ticker),
        ProviderId::Investidor10 => Investidor10Adapter::page_url(ticker, EntityKind::Stock),
    }
}

fn minimal_stock_page(id: ProviderId) -> &'static str {
    match id {
        ProviderId::StockAnalysis => r#"{"type":"data","nodes":[]}"#,
        ProviderId::Investidor10 => "<script>var mainTicker = {\"id\": 7};\nvar ready = true;</script>",
    }
}

fn minimal_stock_cases(ticker: &Ticker) -> Vec<ProviderCase> {
    [ProviderId::StockAnalysis, ProviderId::Investidor10]
        .into_iter()
        .map(|id| {
            case(
                id,
                FixtureHttpClient::new().with_body(stock_url(id, ticker), minimal_stock_page(id)),
            )
        })
        .collect()
}

fn server_error_cases(ticker: &Ticker) -> Vec<ProviderCase> {
    [ProviderId::StockAnalysis, ProviderId::Investidor10]
        .into_iter()
        .map(|id| {
            case(
                id,
                FixtureHttpClient::new()
                    .with_response(stock_url(id, ticker), HttpResponse::with_status(503, "")),
            )
        })
        .collect()
}

fn minimal_etf_cases(ticker: &Ticker) -> Vec<ProviderCase> {
    vec![
        case(
            ProviderId::StockAnalysis,
            FixtureHttpClient::new().with_body(
                StockAnalysisAdapter::etf_url(ticker),
                "<script>const data = {};news: []</script>",
            ),
        ),
        case(
            ProviderId::Investidor10,
            FixtureHttpClient::new().with_body(
                Investidor10Adapter::page_url(ticker, EntityKind::Etf),
                "<h2 class=\"name-company\">Vanguard S&amp;P 500 ETF</h2>",
            ),
        ),
    ]
}

fn request(ticker: &Ticker, kind: EntityKind, fields: FieldSet) -> FetchRequest {
    FetchRequest::new(ticker.clone(), kind, fields).expect("valid fetch request")
}

#[test]
fn providers_report_their_identity_and_serve_every_kind() {
    let cases = unreachable_cases();
    assert_ne!(cases[0].source.id(), cases[1].source.id());

    for case in &cases {
        assert_eq!(case.source.id(), case.id);
        for kind in EntityKind::ALL {
            assert!(
                case.source.supports(kind),
                "provider '{}' must support '{kind}'",
                case.id.as_str()
            );
        }
    }
}

#[tokio::test]
async fn upstream_404_is_reported_as_not_found() {
    let ticker = Ticker::parse("AAPL").expect("valid ticker");

    for kind in EntityKind::ALL {
        for case in unreachable_cases() {
            let error = case
                .source
                .fetch(request(&ticker, kind, FieldSet::from([FieldName::Price])))
                .await
                .expect_err("missing page must fail");
            assert_eq!(
                error.kind(),
                SourceErrorKind::NotFound,
                "provider '{}' kind '{kind}': {error}",
                case.id.as_str()
            );
        }
    }
}

#[tokio::test]
async fn undecodable_pages_are_reported_as_malformed() {
    let ticker = Ticker::parse("AAPL").expect("valid ticker");
    let cases = vec![
        case(
            ProviderId::StockAnalysis,
            FixtureHttpClient::new()
                .with_body(StockAnalysisAdapter::overview_url(&ticker), "<html>maintenance</html>"),
        ),
        case(
            ProviderId::Investidor10,
            FixtureHttpClient::new().with_body(
                Investidor10Adapter::page_url(&ticker, EntityKind::Stock),
                "<html>maintenance</html>",
            ),
        ),
    ];

    for case in cases {
        let error = case
            .source
            .fetch(request(&ticker, EntityKind::Stock, FieldSet::from([FieldName::Price])))
            .await
            .expect_err("undecodable page must fail");
        assert_eq!(
            error.kind(),
            SourceErrorKind::Malformed,
            "provider '{}': {error}",
            case.id.as_str()
        );
    }
}

#[tokio::test]
async fn repeated_failures_open_the_circuit() {
    let ticker = Ticker::parse("AAPL").expect("valid ticker");

    for case in server_error_cases(&ticker) {
        for _ in 0..3 {
            let _ = case
                .source
                .fetch(request(&ticker, EntityKind::Stock, FieldSet::from([FieldName::Price])))
                .await;
        }
        let error = case
            .source
            .fetch(request(&ticker, EntityKind::Stock, FieldSet::from([FieldName::Price])))
            .await
            .expect_err("open circuit must fail");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.message().contains("circuit open"), "{error}");
        assert_eq!(
            case.client.requested_urls().len(),
            3,
            "provider '{}' must not reach upstream while open",
            case.id.as_str()
        );
    }
}

#[tokio::test]
async fn unknown_tickers_do_not_open_the_circuit_for_valid_ones() {
    let valid = Ticker::parse("AAPL").expect("valid ticker");
    let unknown = ["ZZZZ1", "ZZZZ2", "ZZZZ3"]
        .map(|raw| Ticker::parse(raw).expect("valid ticker"));

    for case in minimal_stock_cases(&valid) {
        for ticker in &unknown {
            let error = case
                .source
                .fetch(request(ticker, EntityKind::Stock, FieldSet::from([FieldName::Price])))
                .await
                .expect_err("unknown ticker must fail");
            assert_eq!(error.kind(), SourceErrorKind::NotFound, "{error}");
        }

        let record = case
            .source
            .fetch(request(&valid, EntityKind::Stock, FieldSet::from([FieldName::Price])))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' failed: {error}", case.id.as_str()));

        assert!(record.get(FieldName::Price).is_some(), "provider '{}'", case.id.as_str());
        assert_eq!(
            case.client.requested_urls().last(),
            Some(&stock_url(case.id, &valid)),
            "provider '{}' must still reach upstream",
            case.id.as_str()
        );
    }
}

#[tokio::test]
async fn every_requested_stock_field_is_present_even_when_unknown() {
    let ticker = Ticker::parse("AAPL").expect("valid ticker");
    let fields = FieldSet::from([FieldName::Price, FieldName::Name, FieldName::Sector]);

    for case in minimal_stock_cases(&ticker) {
        let record = case
            .source
            .fetch(request(&ticker, EntityKind::Stock, fields.clone()))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' failed: {error}", case.id.as_str()));

        assert_eq!(record.field_names(), fields, "provider '{}'", case.id.as_str());
        for field in fields.iter() {
            assert!(
                !record.is_resolved(field),
                "provider '{}' invented a value for '{field}'",
                case.id.as_str()
            );
        }
        assert_eq!(
            case.client.requested_urls().len(),
            1,
            "provider '{}' downloaded auxiliary data that was not needed",
            case.id.as_str()
        );
    }
}

#[tokio::test]
async fn every_requested_etf_field_is_present_even_when_unknown() {
    let ticker = Ticker::parse("VOO").expect("valid ticker");
    let fields = FieldSet::from([FieldName::Price, FieldName::Dy]);

    for case in minimal_etf_cases(&ticker) {
        let record = case
            .source
            .fetch(request(&ticker, EntityKind::Etf, fields.clone()))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' failed: {error}", case.id.as_str()));

        assert_eq!(record.field_names(), fields, "provider '{}'", case.id.as_str());
        assert!(!record.is_resolved(FieldName::Price));
        assert!(!record.is_resolved(FieldName::Dy));
    }
}
