//! JSON portfolio description loader.
//!
//! ```json
//! { "name": "savings", "cash": 2500.0, "VTI": 12.5, "BND": 40 }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::domain::config_validation::PortfolioSource;
use crate::domain::directive::CASH_KEY;
use crate::domain::error::PsymError;
use crate::domain::portfolio::Portfolio;

#[derive(Debug, Deserialize)]
struct PortfolioDescription {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cash: f64,
    #[serde(flatten)]
    holdings: BTreeMap<String, f64>,
}

/// Build the starting portfolio for `source`.
pub fn load_portfolio(source: &PortfolioSource) -> Result<Portfolio, PsymError> {
    match source {
        PortfolioSource::Empty => Ok(Portfolio::empty()),
        PortfolioSource::File(path) => load_portfolio_file(path),
    }
}

pub fn load_portfolio_file(path: &Path) -> Result<Portfolio, PsymError> {
    let content = fs::read_to_string(path).map_err(|e| PsymError::PortfolioFile {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_portfolio(&content, &path.display().to_string())
}

/// Parse a portfolio description; `file` only labels errors.
pub fn parse_portfolio(json: &str, file: &str) -> Result<Portfolio, PsymError> {
    let invalid = |reason: String| PsymError::PortfolioFile {
        file: file.to_string(),
        reason,
    };

    let desc: PortfolioDescription =
        serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

    if !desc.cash.is_finite() || desc.cash < 0.0 {
        return Err(invalid(format!("cash must be non-negative, got {}", desc.cash)));
    }

    let mut portfolio = Portfolio::new(desc.cash);
    portfolio.name = desc.name;
    let mut seen = BTreeSet::new();
    for (ticker, shares) in desc.holdings {
        if !seen.insert(ticker.to_uppercase()) {
            return Err(invalid(format!(
                "ticker {} is listed twice",
                ticker.to_uppercase()
            )));
        }
        if ticker.eq_ignore_ascii_case(CASH_KEY) {
            return Err(invalid(format!("{} is reserved, use \"cash\"", CASH_KEY)));
        }
        if !shares.is_finite() || shares < 0.0 {
            return Err(invalid(format!(
                "{} shares must be non-negative, got {}",
                ticker, shares
            )));
        }
        portfolio = portfolio.with_holding(&ticker, shares);
    }
    Ok(portfolio)
}
