use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::extract::{self, DividendPoint, Extractor, NumberFormat};
use super::{decode_json, download};
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{FetchFuture, FetchRequest, SourceError, SourceProvider};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{EntityKind, FieldName, FieldValue, ProviderId, Record, Ticker, UtcDateTime};

const BASE_URL: &str = "https://investidor10.com.br";
const REQUEST_TIMEOUT_MS: u64 = 8_000;

/// Fields that need the dividend chart download.
const DIVIDEND_FIELDS: [FieldName; 2] = [FieldName::LatestsDividends, FieldName::AvgAnnualDividends];

/// investidor10.com.br adapter.
///
/// Stock and REIT pages embed the whole ticker model as a `mainTicker`
/// script variable; ETF pages are read from their markup. Dividend history
/// comes from a separate chart API keyed by the upstream id.
pub struct Investidor10Adapter {
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    timeout_ms: u64,
}

impl Default for Investidor10Adapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl Investidor10Adapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            circuit_breaker: Arc::new(CircuitBreaker::for_provider(ProviderId::Investidor10)),
            timeout_ms: REQUEST_TIMEOUT_MS,
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn page_url(ticker: &Ticker, kind: EntityKind) -> String {
        let section = match kind {
            EntityKind::Stock => "stocks",
            EntityKind::Reit => "reits",
            EntityKind::Etf => "etfs-global",
        };
        format!(
            "{BASE_URL}/{section}/{}/",
            urlencoding::encode(&ticker.to_lowercase())
        )
    }

    pub fn equity_dividends_url(upstream_id: &str) -> String {
        format!(
            "{BASE_URL}/api/stock/dividendos/chart/{}/3650/ano",
            urlencoding::encode(upstream_id)
        )
    }

    pub fn etf_dividends_url(upstream_id: &str) -> String {
        format!(
            "{BASE_URL}/api/etfs/dividendos/chart/{}/1825/ano",
            urlencoding::encode(upstream_id)
        )
    }

    async fn get(&self, url: String, referer: &str) -> Result<String, SourceError> {
        let request = HttpRequest::get(url)
            .with_browser_headers(referer)
            .with_header("upgrade-insecure-requests", "1")
            .with_timeout_ms(self.timeout_ms);
        download(
            ProviderId::Investidor10,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            request,
        )
        .await
    }

    /// Dividend history; a failed download only nulls the dividend fields.
    async fn dividends(&self, url: String, referer: &str, ticker: &Ticker) -> Vec<DividendPoint> {
        let payload = match self.get(url, referer).await {
            Ok(body) => decode_json(ProviderId::Investidor10, "dividends", &body),
            Err(error) => Err(error),
        };
        match payload {
            Ok(payload) => extract::dividend_points(&payload),
            Err(error) => {
                warn!(ticker = %ticker, %error, "dividend history unavailable");
                Vec::new()
            }
        }
    }

    async fn fetch_equity(&self, req: &FetchRequest) -> Result<Record, SourceError> {
        let url = Self::page_url(&req.ticker, req.kind);
        let page = self.get(url.clone(), BASE_URL).await?;

        let script = extract::anchored(&page, "var mainTicker =", "var ")
            .map(|raw| raw.trim().trim_end_matches(';'))
            .ok_or_else(|| {
                SourceError::malformed(format!(
                    "investidor10 page for '{}' has no ticker model",
                    req.ticker
                ))
            })?;
        let main = decode_json(ProviderId::Investidor10, "ticker model", script)?;
        if !main.is_object() {
            return Err(SourceError::malformed(format!(
                "investidor10 ticker model for '{}' is not an object",
                req.ticker
            )));
        }

        let upstream_id = main.get("id").and_then(extract::json_text);
        let dividends = match upstream_id {
            Some(id) if req.fields.contains_any(&DIVIDEND_FIELDS) => {
                self.dividends(Self::equity_dividends_url(&id), &url, &req.ticker)
                    .await
            }
            _ => Vec::new(),
        };

        let payload = EquityPayload {
            balance: latest_by_date(main.get("balances"), "reference_date"),
            quotation: latest_by_date(main.get("quotations"), "date"),
            main,
            dividends,
            current_year: UtcDateTime::now().year(),
        };
        Ok(extract::evaluate(&payload, &req.fields, equity_extractor))
    }

    async fn fetch_etf(&self, req: &FetchRequest) -> Result<Record, SourceError> {
        let url = Self::page_url(&req.ticker, EntityKind::Etf);
        let page = self.get(url.clone(), BASE_URL).await?;
        if !page.contains("name-company") {
            return Err(SourceError::malformed(format!(
                "investidor10 ETF page for '{}' lacks the header block",
                req.ticker
            )));
        }

        let upstream_id = extract::anchored(&page, "etfId\" value=\"", "\"").map(str::to_owned);
        let dividends = match upstream_id {
            Some(id) if req.fields.contains_any(&DIVIDEND_FIELDS) => {
                self.dividends(Self::etf_dividends_url(&id), &url, &req.ticker)
                    .await
            }
            _ => Vec::new(),
        };

        let payload = EtfPayload {
            page,
            dividends,
            current_year: UtcDateTime::now().year(),
        };
        Ok(extract::evaluate(&payload, &req.fields, etf_extractor))
    }
}

impl SourceProvider for Investidor10Adapter {
    fn id(&self) -> ProviderId {
        ProviderId::Investidor10
    }

    fn supports(&self, _kind: EntityKind) -> bool {
        true
    }

    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a> {
        Box::pin(async move {
            match req.kind {
                EntityKind::Stock | EntityKind::Reit => self.fetch_equity(&req).await,
                EntityKind::Etf => self.fetch_etf(&req).await,
            }
        })
    }
}

/// Entry of `items` with the greatest ISO-8601 `key`.
fn latest_by_date(items: Option<&Value>, key: &str) -> Option<Value> {
    items?
        .as_array()?
        .iter()
        .filter_map(|item| Some((item.get(key)?.as_str()?, item)))
        .max_by(|left, right| left.0.cmp(right.0))
        .map(|(_, item)| item.clone())
}

struct EquityPayload {
    main: Value,
    balance: Option<Value>,
    quotation: Option<Value>,
    dividends: Vec<DividendPoint>,
    current_year: i32,
}

impl EquityPayload {
    fn text(&self, pointer: &str) -> Option<String> {
        self.main.pointer(pointer).and_then(extract::json_text)
    }

    fn balance_number(&self, pointer: &str) -> Option<f64> {
        self.balance
            .as_ref()
            .and_then(|balance| balance.pointer(pointer))
            .and_then(|value| extract::json_number(value, NumberFormat::DecimalPoint))
    }
}

fn equity_extractor(field: FieldName) -> Option<Extractor<EquityPayload>> {
    let extractor: Extractor<EquityPayload> = match field {
        FieldName::Name => |p| {
            p.text("/company_name")
                .map(|name| extract::strip_kind_suffix(&name))
                .into()
        },
        FieldName::Type => |p| p.text("/type").into(),
        FieldName::Sector => |p| p.text("/industry/sector/name").into(),
        FieldName::Actuation => |p| p.text("/industry/name").into(),
        FieldName::Price => |p| {
            p.quotation
                .as_ref()
                .and_then(|quotation| quotation.get("price"))
                .and_then(|price| extract::json_number(price, NumberFormat::DecimalPoint))
                .into()
        },
        FieldName::Liquidity => |p| p.balance_number("/volume_avg").into(),
        FieldName::TotalIssuedShares => |p| p.balance_number("/shares_outstanding").into(),
        FieldName::EquityValue => |p| p.balance_number("/total_equity").into(),
        FieldName::NetRevenue => |p| p.balance_number("/revenue").into(),
        FieldName::NetProfit => |p| p.balance_number("/net_income").into(),
        FieldName::NetMargin => |p| p.balance_number("/net_margin").into(),
        FieldName::GrossMargin => |p| p.balance_number("/gross_margin").into(),
        FieldName::CagrRevenue => |p| p.balance_number("/growth_net_revenue_last_5_years").into(),
        FieldName::CagrProfit => |p| p.balance_number("/growth_net_profit_last_5_years").into(),
        FieldName::Debit => |p| p.balance_number("/long_term_debt").into(),
        FieldName::Ebit => |p| p.balance_number("/ebit").into(),
        FieldName::Variation12m => |p| p.balance_number("/variation_year").into(),
        FieldName::Pvp => |p| p.balance_number("/pvp").into(),
        FieldName::Dy => |p| p.balance_number("/dy").into(),
        FieldName::AssetsValue => |p| p.balance_number("/total_assets").into(),
        FieldName::MarketValue => |p| p.balance_number("/market_cap").into(),
        FieldName::Pl => |p| p.balance_number("/pl").into(),
        FieldName::Roe => |p| p.balance_number("/roe").into(),
        FieldName::Payout => |p| {
            p.balance_number("/api_info/common_size_ratios/dividend_payout_ratio")
                .into()
        },
        FieldName::InitialDate => |p| {
            p.main
                .get("start_year_on_stock_exchange")
                .map_or(FieldValue::Null, extract::json_scalar)
        },
        FieldName::LatestsDividends => |p| extract::latest_dividend(&p.dividends, p.current_year).into(),
        FieldName::AvgAnnualDividends => |p| extract::mean_dividend(&p.dividends).into(),
        _ => return None,
    };
    Some(extractor)
}

struct EtfPayload {
    page: String,
    dividends: Vec<DividendPoint>,
    current_year: i32,
}

impl EtfPayload {
    fn number(&self, start: &str, end: &str) -> Option<f64> {
        extract::anchored_text(&self.page, start, end)
            .and_then(|raw| extract::parse_number(&raw, NumberFormat::DecimalComma))
    }
}

fn etf_extractor(field: FieldName) -> Option<Extractor<EtfPayload>> {
    let extractor: Extractor<EtfPayload> = match field {
        FieldName::Name => |p| {
            extract::anchored_text(&p.page, "name-company\">", "<")
                .map(|name| extract::strip_kind_suffix(&name))
                .into()
        },
        FieldName::Type => |_| FieldValue::text(EntityKind::Etf.label()),
        FieldName::Price => |p| p.number("<span class=\"value\">US$", "</span>").into(),
        FieldName::Variation12m => |p| p.number("VARIAÇÃO (12M)</span>", "</span>").into(),
        FieldName::Dy => |p| p.number("DY</span>", "</span>").into(),
        FieldName::AssetsValue => |p| {
            extract::anchored_text(&p.page, "Capitalização</span>", "</span>")
                .and_then(|raw| extract::parse_magnitude(&raw, NumberFormat::DecimalComma))
                .into()
        },
        FieldName::LatestsDividends => |p| extract::latest_dividend(&p.dividends, p.current_year).into(),
        FieldName::AvgAnnualDividends => |p| extract::mean_dividend(&p.dividends).into(),
        _ => return None,
    };
    Some(extractor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::FixtureHttpClient;
    use crate::FieldSet;
    use serde_json::json;

    fn ticker(value: &str) -> Ticker {
        Ticker::parse(value).expect("valid ticker")
    }

    fn equity_page() -> String {
        let model = json!({
            "id": 1234,
            "company_name": "Realty Income REIT",
            "type": "REIT",
            "start_year_on_stock_exchange": 1994,
            "industry": {"name": "Retail REITs", "sector": {"name": "Real Estate"}},
            "balances": [
                {"reference_date": "2023-12-31T00:00:00.000000Z", "pvp": "1.10", "dy": "5.1"},
                {"reference_date": "2024-06-30T00:00:00.000000Z", "pvp": "1.25", "dy": "5.6",
                 "market_cap": 48000000000_u64,
                 "api_info": {"common_size_ratios": {"dividend_payout_ratio": "75.5"}}}
            ],
            "quotations": [
                {"date": "2024-07-01T00:00:00.000000Z", "price": 54.5},
                {"date": "2024-06-28T00:00:00.000000Z", "price": 53.0}
            ]
        });
        format!("<html><script>var mainTicker = {model};\nvar otherThing = 1;</script></html>")
    }

    fn request(ticker: Ticker, kind: EntityKind, fields: FieldSet) -> FetchRequest {
        FetchRequest::new(ticker, kind, fields).expect("valid request")
    }

    #[tokio::test]
    async fn equity_model_uses_latest_balance_and_quotation() {
        let o = ticker("O");
        let client = Arc::new(
            FixtureHttpClient::new()
                .with_body(Investidor10Adapter::page_url(&o, EntityKind::Reit), equity_page()),
        );
        let adapter = Investidor10Adapter::with_http_client(client.clone());

        let record = adapter
            .fetch(request(
                o.clone(),
                EntityKind::Reit,
                FieldSet::from([
                    FieldName::Name,
                    FieldName::Type,
                    FieldName::Sector,
                    FieldName::Actuation,
                    FieldName::Price,
                    FieldName::Pvp,
                    FieldName::MarketValue,
                    FieldName::Payout,
                    FieldName::InitialDate,
                    FieldName::Beta,
                ]),
            ))
            .await
            .expect("fetch succeeds");

        assert_eq!(record.get(FieldName::Name), Some(&FieldValue::text("Realty Income")));
        assert_eq!(record.get(FieldName::Type), Some(&FieldValue::text("REIT")));
        assert_eq!(record.get(FieldName::Sector), Some(&FieldValue::text("Real Estate")));
        assert_eq!(record.get(FieldName::Actuation), Some(&FieldValue::text("Retail REITs")));
        assert_eq!(record.get(FieldName::Price), Some(&FieldValue::Number(54.5)));
        assert_eq!(record.get(FieldName::Pvp), Some(&FieldValue::Number(1.25)));
        assert_eq!(record.get(FieldName::MarketValue), Some(&FieldValue::Number(48e9)));
        assert_eq!(record.get(FieldName::Payout), Some(&FieldValue::Number(75.5)));
        assert_eq!(record.get(FieldName::InitialDate), Some(&FieldValue::Number(1994.0)));
        assert_eq!(record.get(FieldName::Beta), Some(&FieldValue::Null));
        assert_eq!(
            client.requested_urls(),
            vec![Investidor10Adapter::page_url(&o, EntityKind::Reit)],
            "dividend history must not be downloaded when not requested"
        );
    }

    #[tokio::test]
    async fn equity_dividends_come_from_chart_api() {
        let o = ticker("O");
        let year = UtcDateTime::now().year();
        let client = Arc::new(
            FixtureHttpClient::new()
                .with_body(Investidor10Adapter::page_url(&o, EntityKind::Stock), equity_page())
                .with_body(
                    Investidor10Adapter::equity_dividends_url("1234"),
                    json!([
                        {"created_at": year - 2, "price": 2.0},
                        {"created_at": year - 1, "price": 3.0},
                        {"created_at": year, "price": 4.0}
                    ])
                    .to_string(),
                ),
        );
        let adapter = Investidor10Adapter::with_http_client(client);

        let record = adapter
            .fetch(request(
                o,
                EntityKind::Stock,
                FieldSet::from([FieldName::LatestsDividends, FieldName::AvgAnnualDividends]),
            ))
            .await
            .expect("fetch succeeds");

        assert_eq!(record.get(FieldName::LatestsDividends), Some(&FieldValue::Number(4.0)));
        assert_eq!(record.get(FieldName::AvgAnnualDividends), Some(&FieldValue::Number(3.0)));
    }

    #[tokio::test]
    async fn page_without_ticker_model_is_malformed() {
        let o = ticker("O");
        let client = Arc::new(FixtureHttpClient::new().with_body(
            Investidor10Adapter::page_url(&o, EntityKind::Stock),
            "<html>maintenance</html>",
        ));
        let adapter = Investidor10Adapter::with_http_client(client);

        let error = adapter
            .fetch(request(o, EntityKind::Stock, FieldSet::from([FieldName::Price])))
            .await
            .expect_err("no model");
        assert_eq!(error.kind(), SourceErrorKind::Malformed);
    }

    #[tokio::test]
    async fn etf_markup_fields_and_dividend_fallback() {
        let voo = ticker("VOO");
        let year = UtcDateTime::now().year();
        let page = concat!(
            "<input type=\"hidden\" id=\"etfId\" value=\"77\">",
            "<h2 class=\"name-company\">Vanguard S&amp;P 500 ETF</h2>",
            "<div class=\"_card cotacao\"><span class=\"value\">US$ 512,30</span></div>",
            "<span title=\"Variação\">VARIAÇÃO (12M)</span><div class=\"_card-body\"><span>24,50%</span></div>",
            "<span title=\"Dividend Yield\">DY</span><div class=\"_card-body\"><span>1,32%</span></div>",
            "<span>Capitalização</span><div class=\"_card-body\"><span>US$ 1,5 Trilhões</span></div>"
        );
        let client = Arc::new(
            FixtureHttpClient::new()
                .with_body(Investidor10Adapter::page_url(&voo, EntityKind::Etf), page)
                .with_body(
                    Investidor10Adapter::etf_dividends_url("77"),
                    json!([
                        {"created_at": year - 1, "price": 6.2},
                        {"created_at": year, "price": 0}
                    ])
                    .to_string(),
                ),
        );
        let adapter = Investidor10Adapter::with_http_client(client);

        let record = adapter
            .fetch(request(
                voo,
                EntityKind::Etf,
                FieldSet::from([
                    FieldName::Name,
                    FieldName::Type,
                    FieldName::Price,
                    FieldName::Variation12m,
                    FieldName::Dy,
                    FieldName::AssetsValue,
                    FieldName::LatestsDividends,
                    FieldName::AvgAnnualDividends,
                    FieldName::Sector,
                ]),
            ))
            .await
            .expect("fetch succeeds");

        assert_eq!(record.get(FieldName::Name), Some(&FieldValue::text("Vanguard S&P 500")));
        assert_eq!(record.get(FieldName::Type), Some(&FieldValue::text("ETF")));
        assert_eq!(record.get(FieldName::Price), Some(&FieldValue::Number(512.3)));
        assert_eq!(record.get(FieldName::Variation12m), Some(&FieldValue::Number(24.5)));
        assert_eq!(record.get(FieldName::Dy), Some(&FieldValue::Number(1.32)));
        assert_eq!(record.get(FieldName::AssetsValue), Some(&FieldValue::Number(1.5e12)));
        assert_eq!(record.get(FieldName::LatestsDividends), Some(&FieldValue::Number(6.2)));
        assert_eq!(record.get(FieldName::AvgAnnualDividends), Some(&FieldValue::Number(3.1)));
        assert_eq!(record.get(FieldName::Sector), Some(&FieldValue::Null));
    }
}
