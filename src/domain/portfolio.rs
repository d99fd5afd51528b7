//! Portfolio state: cash plus fractional share holdings.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::error::SimulationError;
use crate::ports::price_port::PriceProvider;

/// Share counts at or below this are dropped from the holdings map.
pub const SHARE_DUST: f64 = 1e-9;

/// Relative cash shortfall treated as rounding noise.
pub const CASH_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Portfolio {
    pub name: Option<String>,
    cash: f64,
    holdings: BTreeMap<String, f64>,
    contributed: f64,
}

impl Portfolio {
    pub fn new(cash: f64) -> Self {
        Portfolio {
            cash,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed a holding at construction time. Ticker is upper-cased.
    pub fn with_holding(mut self, ticker: &str, shares: f64) -> Self {
        if shares > SHARE_DUST {
            self.holdings.insert(ticker.to_uppercase(), shares);
        }
        self
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Net cash added by deposits minus withdrawals.
    pub fn contributed(&self) -> f64 {
        self.contributed
    }

    pub fn shares(&self, ticker: &str) -> f64 {
        self.holdings.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn holdings(&self) -> &BTreeMap<String, f64> {
        &self.holdings
    }

    fn exceeds_cash(&self, amount: f64) -> bool {
        amount > self.cash + CASH_EPSILON * self.cash.abs().max(1.0)
    }

    pub fn deposit(&mut self, amount: f64) {
        self.cash += amount;
        self.contributed += amount;
    }

    /// Remove cash. Fails without touching state when `amount` exceeds cash.
    pub fn withdraw(
        &mut self,
        amount: f64,
        date: NaiveDate,
        line: usize,
    ) -> Result<(), SimulationError> {
        if self.exceeds_cash(amount) {
            return Err(SimulationError::InsufficientCash {
                date,
                line,
                requested: amount,
                available: self.cash,
            });
        }
        self.cash = (self.cash - amount).max(0.0);
        self.contributed -= amount;
        Ok(())
    }

    /// Dividends and interest: cash that is not a contribution.
    pub fn credit_income(&mut self, amount: f64) {
        self.cash += amount;
    }

    /// Change a holding by `delta` shares without moving cash.
    pub fn apply_trade(&mut self, ticker: &str, delta: f64) -> Result<(), SimulationError> {
        let held = self.shares(ticker);
        let next = held + delta;
        if next < -SHARE_DUST {
            return Err(SimulationError::NegativeShares {
                ticker: ticker.to_string(),
                held,
                delta,
            });
        }
        if next <= SHARE_DUST {
            self.holdings.remove(ticker);
        } else {
            self.holdings.insert(ticker.to_string(), next);
        }
        Ok(())
    }

    /// Buy (positive `delta`) or sell shares at `price`, settling in cash.
    ///
    /// Returns the signed cash amount that left the account.
    pub fn trade(
        &mut self,
        ticker: &str,
        delta: f64,
        price: f64,
        date: NaiveDate,
        line: usize,
    ) -> Result<f64, SimulationError> {
        let cost = delta * price;
        if self.exceeds_cash(cost) {
            return Err(SimulationError::InsufficientCash {
                date,
                line,
                requested: cost,
                available: self.cash,
            });
        }
        self.apply_trade(ticker, delta)?;
        self.cash = (self.cash - cost).max(0.0);
        Ok(cost)
    }

    /// Market value of all holdings on `date`.
    pub fn holdings_value(
        &self,
        date: NaiveDate,
        prices: &dyn PriceProvider,
    ) -> Result<f64, SimulationError> {
        self.holdings
            .iter()
            .map(|(ticker, shares)| {
                prices
                    .price(ticker, date)
                    .map(|p| p * shares)
                    .ok_or_else(|| SimulationError::PriceUnavailable {
                        ticker: ticker.clone(),
                        date,
                    })
            })
            .sum()
    }

    /// Cash plus holdings value on `date`.
    pub fn value(&self, date: NaiveDate, prices: &dyn PriceProvider) -> Result<f64, SimulationError> {
        Ok(self.cash + self.holdings_value(date, prices)?)
    }
}
