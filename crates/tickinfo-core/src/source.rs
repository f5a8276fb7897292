use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used in fallback chains and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    StockAnalysis,
    Investidor10,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::StockAnalysis, Self::Investidor10];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StockAnalysis => "stockanalysis",
            Self::Investidor10 => "investidor10",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stockanalysis" => Ok(Self::StockAnalysis),
            "investidor10" => Ok(Self::Investidor10),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
