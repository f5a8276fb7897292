use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Closed vocabulary of metrics a ticker can be asked for.
///
/// Declaration order is the canonical output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Actuation,
    AssetsValue,
    AvgAnnualDividends,
    CagrProfit,
    CagrRevenue,
    Debit,
    Dy,
    Ebit,
    EnterpriseValue,
    EquityValue,
    EquityPrice,
    GrossMargin,
    InitialDate,
    LatestsDividends,
    Link,
    Liquidity,
    ManagementFee,
    MarketValue,
    #[serde(rename = "max_52_weeks")]
    Max52Weeks,
    #[serde(rename = "min_52_weeks")]
    Min52Weeks,
    Name,
    NetMargin,
    NetProfit,
    NetRevenue,
    Payout,
    Pl,
    Price,
    Pvp,
    Roe,
    Sector,
    TotalIssuedShares,
    Type,
    #[serde(rename = "variation_12m")]
    Variation12m,
    #[serde(rename = "variation_30d")]
    Variation30d,
    Beta,
}

impl FieldName {
    pub const ALL: [Self; 35] = [
        Self::Actuation,
        Self::AssetsValue,
        Self::AvgAnnualDividends,
        Self::CagrProfit,
        Self::CagrRevenue,
        Self::Debit,
        Self::Dy,
        Self::Ebit,
        Self::EnterpriseValue,
        Self::EquityValue,
        Self::EquityPrice,
        Self::GrossMargin,
        Self::InitialDate,
        Self::LatestsDividends,
        Self::Link,
        Self::Liquidity,
        Self::ManagementFee,
        Self::MarketValue,
        Self::Max52Weeks,
        Self::Min52Weeks,
        Self::Name,
        Self::NetMargin,
        Self::NetProfit,
        Self::NetRevenue,
        Self::Payout,
        Self::Pl,
        Self::Price,
        Self::Pvp,
        Self::Roe,
        Self::Sector,
        Self::TotalIssuedShares,
        Self::Type,
        Self::Variation12m,
        Self::Variation30d,
        Self::Beta,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Actuation => "actuation",
            Self::AssetsValue => "assets_value",
            Self::AvgAnnualDividends => "avg_annual_dividends",
            Self::CagrProfit => "cagr_profit",
            Self::CagrRevenue => "cagr_revenue",
            Self::Debit => "debit",
            Self::Dy => "dy",
            Self::Ebit => "ebit",
            Self::EnterpriseValue => "enterprise_value",
            Self::EquityValue => "equity_value",
            Self::EquityPrice => "equity_price",
            Self::GrossMargin => "gross_margin",
            Self::InitialDate => "initial_date",
            Self::LatestsDividends => "latests_dividends",
            Self::Link => "link",
            Self::Liquidity => "liquidity",
            Self::ManagementFee => "management_fee",
            Self::MarketValue => "market_value",
            Self::Max52Weeks => "max_52_weeks",
            Self::Min52Weeks => "min_52_weeks",
            Self::Name => "name",
            Self::NetMargin => "net_margin",
            Self::NetProfit => "net_profit",
            Self::NetRevenue => "net_revenue",
            Self::Payout => "payout",
            Self::Pl => "pl",
            Self::Price => "price",
            Self::Pvp => "pvp",
            Self::Roe => "roe",
            Self::Sector => "sector",
            Self::TotalIssuedShares => "total_issued_shares",
            Self::Type => "type",
            Self::Variation12m => "variation_12m",
            Self::Variation30d => "variation_30d",
            Self::Beta => "beta",
        }
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or(ValidationError::UnknownField { value: normalized })
    }
}

/// Ordered set of requested fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet(BTreeSet<FieldName>);

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full vocabulary.
    pub fn all() -> Self {
        FieldName::ALL.into_iter().collect()
    }

    /// Parse a comma-separated list, dropping blanks and unknown names.
    pub fn parse_lenient(input: &str) -> Self {
        input
            .split(',')
            .map(|raw| raw.replace(' ', ""))
            .filter(|raw| !raw.is_empty())
            .filter_map(|raw| raw.parse::<FieldName>().ok())
            .collect()
    }

    /// Parse a comma-separated list, failing on the first unknown name.
    pub fn parse_strict(input: &str) -> Result<Self, ValidationError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::parse::<FieldName>)
            .collect()
    }

    pub fn insert(&mut self, field: FieldName) -> bool {
        self.0.insert(field)
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.0.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.0.iter().copied()
    }

    /// True when any of `fields` is requested.
    pub fn contains_any(&self, fields: &[FieldName]) -> bool {
        fields.iter().any(|field| self.contains(*field))
    }
}

impl FromIterator<FieldName> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[FieldName; N]> for FieldSet {
    fn from(value: [FieldName; N]) -> Self {
        value.into_iter().collect()
    }
}

impl Display for FieldSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for field in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(field.as_str())?;
            first = false;
        }
        Ok(())
    }
}

/// Instrument family; selects the provider chain and extraction tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Stock,
    Reit,
    Etf,
}

impl EntityKind {
    pub const ALL: [Self; 3] = [Self::Stock, Self::Reit, Self::Etf];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Reit => "reit",
            Self::Etf => "etf",
        }
    }

    /// Uppercase label reported in the `type` field.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stock => "STOCK",
            Self::Reit => "REIT",
            Self::Etf => "ETF",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" | "stocks" => Ok(Self::Stock),
            "reit" | "reits" => Ok(Self::Reit),
            "etf" | "etfs" => Ok(Self::Etf),
            other => Err(ValidationError::InvalidEntityKind {
                value: other.to_owned(),
            }),
        }
    }
}
