//! Parsed rule-file directives.
//!
//! - `Directive`: one instruction with its source line and trigger plan
//! - `DirectiveKind`: closed set of things a directive can do
//! - `AllocationTarget`: ticker weights produced by a `balance` block
//! - `Trigger`: anchor date (or "simulation start") plus recurrence

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::schedule::{Recurrence, Schedule};

/// Reserved allocation key that keeps part of the value in cash.
pub const CASH_KEY: &str = "CASH";

/// Tolerance, in percentage points, on the 100% allocation sum.
pub const ALLOCATION_TOLERANCE_PCT: f64 = 0.01;

/// Anchor date plus recurrence for a directive.
///
/// `anchor == None` means the directive is anchored at the start of whatever
/// simulation it is run in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub anchor: Option<NaiveDate>,
    pub recurrence: Recurrence,
    pub count: Option<u32>,
}

impl Trigger {
    pub fn at_start() -> Self {
        Trigger {
            anchor: None,
            recurrence: Recurrence::OneShot,
            count: None,
        }
    }

    pub fn on(date: NaiveDate) -> Self {
        Trigger {
            anchor: Some(date),
            recurrence: Recurrence::OneShot,
            count: None,
        }
    }

    /// Concrete schedule for a run beginning on `start`.
    pub fn resolve(&self, start: NaiveDate) -> Schedule {
        Schedule {
            anchor: self.anchor.unwrap_or(start),
            recurrence: self.recurrence,
            count: self.count,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Some(date) => write!(f, "{}", date)?,
            None => write!(f, "start")?,
        }
        match (self.recurrence, self.count) {
            (Recurrence::OneShot, _) => Ok(()),
            (r, Some(n)) => write!(f, " [{}x{}]", n, r),
            (r, None) => write!(f, " [{}]", r),
        }
    }
}

/// Target weights (fractions of total value) keyed by upper-case ticker.
///
/// The weights, including any `CASH` share, sum to 1 within tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationTarget {
    weights: BTreeMap<String, f64>,
    cash_weight: f64,
}

impl AllocationTarget {
    /// Build from already-validated weights; `CASH` is split out.
    pub fn new(mut weights: BTreeMap<String, f64>) -> Self {
        let cash_weight = weights.remove(CASH_KEY).unwrap_or(0.0);
        AllocationTarget {
            weights,
            cash_weight,
        }
    }

    pub fn weight(&self, ticker: &str) -> f64 {
        self.weights.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn cash_weight(&self) -> f64 {
        self.cash_weight
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Sum of all weights, cash included, in percent.
    pub fn total_pct(&self) -> f64 {
        (self.weights.values().sum::<f64>() + self.cash_weight) * 100.0
    }
}

impl fmt::Display for AllocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .weights
            .iter()
            .map(|(t, w)| format!("{}: {:.2}%", t, w * 100.0))
            .collect();
        if self.cash_weight > 0.0 {
            parts.push(format!("{}: {:.2}%", CASH_KEY, self.cash_weight * 100.0));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveKind {
    Deposit {
        amount: f64,
    },
    Withdraw {
        amount: f64,
    },
    SetAllocation {
        target: AllocationTarget,
        /// Rebalance only on these dates; `None` rebalances every day.
        rebalance: Option<Recurrence>,
    },
    ToggleDividends {
        enabled: bool,
        accrual: Recurrence,
    },
    CashInterest {
        yearly_rate: f64,
    },
}

impl DirectiveKind {
    /// Order in which kinds due on the same day are applied.
    pub fn precedence(&self) -> u8 {
        match self {
            DirectiveKind::ToggleDividends { .. } => 0,
            DirectiveKind::SetAllocation { .. } => 1,
            DirectiveKind::Deposit { .. } | DirectiveKind::Withdraw { .. } => 2,
            DirectiveKind::CashInterest { .. } => 3,
        }
    }
}

/// One instruction from a rule file.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub line: usize,
    pub trigger: Trigger,
    pub kind: DirectiveKind,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ", self.line, self.trigger)?;
        match &self.kind {
            DirectiveKind::Deposit { amount } => write!(f, "deposit ${:.2}", amount),
            DirectiveKind::Withdraw { amount } => write!(f, "withdraw ${:.2}", amount),
            DirectiveKind::SetAllocation { target, rebalance } => {
                write!(f, "balance {}", target)?;
                match rebalance {
                    Some(r) => write!(f, " (rebalance {})", r),
                    None => write!(f, " (rebalance daily)"),
                }
            }
            DirectiveKind::ToggleDividends { enabled: true, accrual } => {
                write!(f, "dividends on [{}]", accrual)
            }
            DirectiveKind::ToggleDividends { enabled: false, .. } => write!(f, "dividends off"),
            DirectiveKind::CashInterest { yearly_rate } => {
                write!(f, "cash-interest {:.2}%", yearly_rate * 100.0)
            }
        }
    }
}

/// Every ticker named by an allocation target, sorted.
pub fn referenced_tickers(directives: &[Directive]) -> BTreeSet<String> {
    directives
        .iter()
        .filter_map(|d| match &d.kind {
            DirectiveKind::SetAllocation { target, .. } => Some(target),
            _ => None,
        })
        .flat_map(|t| t.tickers().map(str::to_string))
        .collect()
}
