use std::sync::Arc;

use serde_json::Value;
use time::macros::format_description;
use time::Date;
use tracing::warn;

use super::extract::{self, Extractor, Hop, NumberFormat, SveltePath};
use super::{decode_json, download};
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{FetchFuture, FetchRequest, SourceError, SourceProvider};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::{EntityKind, FieldName, FieldValue, ProviderId, Record, Ticker};

const BASE_URL: &str = "https://stockanalysis.com";
const SVELTE_QUERY: &str = "x-sveltekit-trailing-slash=1&x-sveltekit-invalidated=001";
const REQUEST_TIMEOUT_MS: u64 = 8_000;

// Overview document (`/stocks/{ticker}/__data.json`).
const NAME: SveltePath = SveltePath::new(1, 1, &[Hop::Key("nameFull")]);
const PRICE: SveltePath = SveltePath::new(1, 1, &[Hop::Key("quote"), Hop::Key("cl")]);
const LOW_52W: SveltePath = SveltePath::new(1, 1, &[Hop::Key("quote"), Hop::Key("l52")]);
const HIGH_52W: SveltePath = SveltePath::new(1, 1, &[Hop::Key("quote"), Hop::Key("h52")]);
const INDUSTRY: SveltePath =
    SveltePath::new(2, 0, &[Hop::Key("infoTable"), Hop::Index(0), Hop::Key("v")]);
const SECTOR: SveltePath =
    SveltePath::new(2, 0, &[Hop::Key("infoTable"), Hop::Index(1), Hop::Key("v")]);
const MARKET_CAP: SveltePath = SveltePath::new(2, 0, &[Hop::Key("marketCap")]);
const REVENUE: SveltePath = SveltePath::new(2, 0, &[Hop::Key("revenue")]);
const NET_INCOME: SveltePath = SveltePath::new(2, 0, &[Hop::Key("netIncome")]);
const SHARES_OUT: SveltePath = SveltePath::new(2, 0, &[Hop::Key("sharesOut")]);
const PE_RATIO: SveltePath = SveltePath::new(2, 0, &[Hop::Key("peRatio")]);
const BETA: SveltePath = SveltePath::new(2, 0, &[Hop::Key("beta")]);

// Statistics document (`/stocks/{ticker}/statistics/__data.json`); every
// section is `{ data: [row, ...] }` with rows shaped `{ value }`.
const VARIATION_1Y: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("stockPrice"), Hop::Key("data"), Hop::Index(1), Hop::Key("value")],
);
const AVG_VOLUME: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("stockPrice"), Hop::Key("data"), Hop::Index(5), Hop::Key("value")],
);
const ENTERPRISE_VALUE: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("valuation"), Hop::Key("data"), Hop::Index(1), Hop::Key("value")],
);
const GROSS_MARGIN: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("margins"), Hop::Key("data"), Hop::Index(0), Hop::Key("value")],
);
const NET_MARGIN: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("margins"), Hop::Key("data"), Hop::Index(3), Hop::Key("value")],
);
const TOTAL_DEBT: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("balanceSheet"), Hop::Key("data"), Hop::Index(1), Hop::Key("value")],
);
const EBIT: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("incomeStatement"), Hop::Key("data"), Hop::Index(2), Hop::Key("value")],
);
const ROE: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("financialEfficiency"), Hop::Key("data"), Hop::Index(0), Hop::Key("value")],
);
const ROA: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("financialEfficiency"), Hop::Key("data"), Hop::Index(1), Hop::Key("value")],
);
const DIVIDEND_PER_SHARE: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("dividends"), Hop::Key("data"), Hop::Index(0), Hop::Key("value")],
);
const DIVIDEND_YIELD: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("dividends"), Hop::Key("data"), Hop::Index(1), Hop::Key("value")],
);
const PAYOUT_RATIO: SveltePath = SveltePath::new(
    2,
    0,
    &[Hop::Key("dividends"), Hop::Key("data"), Hop::Index(4), Hop::Key("value")],
);

/// Fields that need the statistics document.
const STATISTICS_FIELDS: [FieldName; 12] = [
    FieldName::AssetsValue,
    FieldName::AvgAnnualDividends,
    FieldName::Debit,
    FieldName::Dy,
    FieldName::Ebit,
    FieldName::EnterpriseValue,
    FieldName::GrossMargin,
    FieldName::Liquidity,
    FieldName::NetMargin,
    FieldName::Payout,
    FieldName::Roe,
    FieldName::Variation12m,
];

/// stockanalysis.com adapter.
///
/// Stocks and REITs are read from the SvelteKit data endpoints; ETFs from the
/// data blob embedded in the ETF page.
pub struct StockAnalysisAdapter {
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    timeout_ms: u64,
}

impl Default for StockAnalysisAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl StockAnalysisAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            circuit_breaker: Arc::new(CircuitBreaker::for_provider(ProviderId::StockAnalysis)),
            timeout_ms: REQUEST_TIMEOUT_MS,
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn overview_url(ticker: &Ticker) -> String {
        format!(
            "{BASE_URL}/stocks/{}/__data.json?{SVELTE_QUERY}",
            urlencoding::encode(&ticker.to_lowercase())
        )
    }

    pub fn statistics_url(ticker: &Ticker) -> String {
        format!(
            "{BASE_URL}/stocks/{}/statistics/__data.json?{SVELTE_QUERY}",
            urlencoding::encode(&ticker.to_lowercase())
        )
    }

    pub fn etf_url(ticker: &Ticker) -> String {
        format!(
            "{BASE_URL}/etf/{}/",
            urlencoding::encode(&ticker.to_lowercase())
        )
    }

    async fn get(&self, url: String) -> Result<String, SourceError> {
        let request = HttpRequest::get(url)
            .with_browser_headers("https://stockanalysis.com/")
            .with_timeout_ms(self.timeout_ms);
        download(
            ProviderId::StockAnalysis,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            request,
        )
        .await
    }

    async fn fetch_equity(&self, req: &FetchRequest) -> Result<Record, SourceError> {
        let body = self.get(Self::overview_url(&req.ticker)).await?;
        let overview = decode_json(ProviderId::StockAnalysis, "overview", &body)?;
        if overview.get("nodes").and_then(Value::as_array).is_none() {
            return Err(SourceError::malformed(format!(
                "stockanalysis overview for '{}' has no data nodes",
                req.ticker
            )));
        }

        let statistics = if req.fields.contains_any(&STATISTICS_FIELDS) {
            match self.get(Self::statistics_url(&req.ticker)).await {
                Ok(body) => decode_json(ProviderId::StockAnalysis, "statistics", &body)
                    .map_err(|error| {
                        warn!(ticker = %req.ticker, %error, "statistics unusable");
                    })
                    .ok(),
                Err(error) => {
                    warn!(ticker = %req.ticker, %error, "statistics unavailable");
                    None
                }
            }
        } else {
            None
        };

        let payload = EquityPayload {
            ticker: req.ticker.clone(),
            kind: req.kind,
            overview,
            statistics,
        };
        Ok(extract::evaluate(&payload, &req.fields, equity_extractor))
    }

    async fn fetch_etf(&self, req: &FetchRequest) -> Result<Record, SourceError> {
        let page = self.get(Self::etf_url(&req.ticker)).await?;
        let blob = extract::anchored(&page, "const data =", "news:")
            .or_else(|| page.split_once("const data =").map(|(_, rest)| rest))
            .ok_or_else(|| {
                SourceError::malformed(format!(
                    "stockanalysis ETF page for '{}' has no data blob",
                    req.ticker
                ))
            })?;

        let payload = EtfPayload {
            blob: blob.to_owned(),
        };
        Ok(extract::evaluate(&payload, &req.fields, etf_extractor))
    }
}

impl SourceProvider for StockAnalysisAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::StockAnalysis
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

struct EquityPayload {
    ticker: Ticker,
    kind: EntityKind,
    overview: Value,
    statistics: Option<Value>,
}

impl EquityPayload {
    fn overview_number(&self, path: SveltePath) -> Option<f64> {
        path.resolve(&self.overview)
            .and_then(|value| extract::json_number(value, NumberFormat::DecimalPoint))
    }

    fn overview_magnitude(&self, path: SveltePath) -> Option<f64> {
        path.resolve(&self.overview)
            .and_then(|value| extract::json_magnitude(value, NumberFormat::DecimalPoint))
    }

    fn overview_text(&self, path: SveltePath) -> Option<String> {
        path.resolve(&self.overview).and_then(extract::json_text)
    }

    fn statistic(&self, path: SveltePath) -> Option<f64> {
        self.statistics
            .as_ref()
            .and_then(|document| path.resolve(document))
            .and_then(|value| extract::json_magnitude(value, NumberFormat::DecimalPoint))
    }

    /// Net income over return on assets (a percentage).
    fn total_assets(&self) -> Option<f64> {
        let roa = self.statistic(ROA).map(|percent| percent / 100.0);
        extract::ratio(self.overview_magnitude(NET_INCOME), roa)
    }
}

fn equity_extractor(field: FieldName) -> Option<Extractor<EquityPayload>> {
    let extractor: Extractor<EquityPayload> = match field {
        FieldName::Name => |p| p.overview_text(NAME).into(),
        FieldName::Type => |p| FieldValue::text(p.kind.label()),
        FieldName::Sector => |p| p.overview_text(SECTOR).into(),
        FieldName::Actuation => |p| p.overview_text(INDUSTRY).into(),
        FieldName::Link => |p| {
            FieldValue::text(format!(
                "{BASE_URL}/stocks/{}/company/",
                p.ticker.to_lowercase()
            ))
        },
        FieldName::Price => |p| p.overview_number(PRICE).into(),
        FieldName::Min52Weeks => |p| p.overview_number(LOW_52W).into(),
        FieldName::Max52Weeks => |p| p.overview_number(HIGH_52W).into(),
        FieldName::MarketValue => |p| p.overview_magnitude(MARKET_CAP).into(),
        FieldName::NetRevenue => |p| p.overview_magnitude(REVENUE).into(),
        FieldName::NetProfit => |p| p.overview_magnitude(NET_INCOME).into(),
        FieldName::TotalIssuedShares => |p| p.overview_magnitude(SHARES_OUT).into(),
        FieldName::Pl => |p| p.overview_number(PE_RATIO).into(),
        FieldName::Beta => |p| p.overview_number(BETA).into(),
        FieldName::Liquidity => |p| p.statistic(AVG_VOLUME).into(),
        FieldName::Variation12m => |p| p.statistic(VARIATION_1Y).into(),
        FieldName::EnterpriseValue => |p| p.statistic(ENTERPRISE_VALUE).into(),
        FieldName::GrossMargin => |p| p.statistic(GROSS_MARGIN).into(),
        FieldName::NetMargin => |p| p.statistic(NET_MARGIN).into(),
        FieldName::Debit => |p| p.statistic(TOTAL_DEBT).into(),
        FieldName::Ebit => |p| p.statistic(EBIT).into(),
        FieldName::Roe => |p| p.statistic(ROE).into(),
        FieldName::Dy => |p| p.statistic(DIVIDEND_YIELD).into(),
        FieldName::AvgAnnualDividends => |p| p.statistic(DIVIDEND_PER_SHARE).into(),
        FieldName::Payout => |p| p.statistic(PAYOUT_RATIO).into(),
        FieldName::AssetsValue => |p| p.total_assets().into(),
        _ => return None,
    };
    Some(extractor)
}

struct EtfPayload {
    blob: String,
}

impl EtfPayload {
    fn text(&self, start: &str, end: &str) -> Option<String> {
        extract::anchored_text(&self.blob, start, end)
    }

    fn number(&self, start: &str, end: &str) -> Option<f64> {
        extract::anchored(&self.blob, start, end)
            .and_then(|raw| extract::parse_number(raw, NumberFormat::DecimalPoint))
    }

    fn magnitude(&self, start: &str, end: &str) -> Option<f64> {
        extract::anchored(&self.blob, start, end)
            .and_then(|raw| extract::parse_magnitude(raw, NumberFormat::DecimalPoint))
    }

    fn price(&self) -> Option<f64> {
        self.number("cl:", ",")
    }

    fn assets_under_management(&self) -> Option<f64> {
        self.magnitude("aum:\"$", "\",")
    }

    fn shares_outstanding(&self) -> Option<f64> {
        self.magnitude("sharesOut:\"", "\",")
    }

    fn equity_price(&self) -> Option<f64> {
        extract::ratio(self.assets_under_management(), self.shares_outstanding())
    }

    fn sector(&self) -> Option<String> {
        let asset_class = self.text("\"Asset Class\",\"", "\"]")?;
        let category = self.text("\"Category\",\"", "\"]")?;
        Some(format!("{asset_class}/{category}"))
    }

    /// Amount of the most recent entry of the dividend table.
    fn newest_dividend(&self) -> Option<f64> {
        let table = extract::anchored(&self.blob, "dividendTable:[", "],")?;
        table
            .split("},")
            .filter_map(|entry| {
                let raw_date = extract::anchored(entry, "dt:\"", "\"")?;
                let date = Date::parse(raw_date, format_description!("[year]-[month]-[day]")).ok()?;
                let after = &entry[entry.find("amt:")? + "amt:".len()..];
                let raw_amount = after.split([',', '}']).next()?;
                let amount = extract::parse_number(raw_amount, NumberFormat::DecimalPoint)?;
                Some((date, amount))
            })
            .max_by_key(|(date, _)| *date)
            .map(|(_, amount)| amount)
    }
}

fn etf_extractor(field: FieldName) -> Option<Extractor<EtfPayload>> {
    let extractor: Extractor<EtfPayload> = match field {
        FieldName::Name => |p| {
            p.text("name:\"", "\",")
                .map(|name| extract::strip_kind_suffix(&name))
                .into()
        },
        FieldName::Type => |_| FieldValue::text(EntityKind::Etf.label()),
        FieldName::Sector => |p| p.sector().into(),
        FieldName::Actuation => |p| p.text("\"Index Tracked\",\"", "\"]").into(),
        FieldName::Link => |p| p.text("etf_website:\"", "\",").into(),
        FieldName::Price => |p| p.price().into(),
        FieldName::Liquidity => |p| p.number("v:", ",").into(),
        FieldName::TotalIssuedShares => |p| p.shares_outstanding().into(),
        FieldName::EquityValue => |p| p.assets_under_management().into(),
        FieldName::EquityPrice => |p| p.equity_price().into(),
        FieldName::Pvp => |p| extract::ratio(p.price(), p.equity_price()).into(),
        FieldName::Variation12m => |p| p.number("ch1y:\"", "\",").into(),
        FieldName::Min52Weeks => |p| p.number("l52:", ",").into(),
        FieldName::Max52Weeks => |p| p.number("h52:", ",").into(),
        FieldName::Dy => |p| p.number("dividendYield:\"", "%\",").into(),
        FieldName::LatestsDividends => |p| p.newest_dividend().into(),
        FieldName::AvgAnnualDividends => |p| {
            p.number("dps:\"$", "\",")
                .map(|per_share| per_share / 12.0)
                .into()
        },
        FieldName::InitialDate => |p| p.text("inception:\"", "\",").into(),
        FieldName::Pl => |p| p.number("peRatio:\"", "\",").into(),
        FieldName::Payout => |p| p.number("payoutRatio:\"", "%\",").into(),
        FieldName::Beta => |p| p.number("beta:\"", "\",").into(),
        FieldName::ManagementFee => |p| p.number("expenseRatio:\"", "%\",").into(),
        _ => return None,
    };
    Some(extractor)
}
