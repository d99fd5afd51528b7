//! Day-by-day simulation driver.
//!
//! Walks every calendar day from `start` to `end` inclusive, hands the
//! directives due that day to the [`Interpreter`], and records one
//! [`ValuationSnapshot`] per day.

use chrono::NaiveDate;
use serde::Serialize;

use super::directive::Directive;
use super::error::{PsymError, SimulationError};
use super::interpreter::{Interpreter, JournalEntry};
use super::metrics::annualized_return;
use super::portfolio::Portfolio;
use super::schedule::ScheduleCursor;
use crate::ports::price_port::PriceProvider;

/// Portfolio valuation at the end of one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub holdings: f64,
    pub total: f64,
    pub contributed: f64,
}

/// One line of the final per-holding breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingBreakdown {
    pub ticker: String,
    pub shares: f64,
    pub value: f64,
    /// Share of total value, in percent.
    pub pct: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Portfolio value on `start` before any directive ran.
    pub initial_value: f64,
    pub snapshots: Vec<ValuationSnapshot>,
    pub annualized_return: f64,
    pub portfolio: Portfolio,
    pub journal: Vec<JournalEntry>,
    breakdown: Vec<HoldingBreakdown>,
}

impl SimulationResult {
    pub fn final_snapshot(&self) -> Option<&ValuationSnapshot> {
        self.snapshots.last()
    }

    /// Holdings at the final snapshot, by ticker, followed by cash.
    pub fn breakdown(&self) -> &[HoldingBreakdown] {
        &self.breakdown
    }
}

/// Run `directives` against `portfolio` over `[start, end]`.
pub fn simulate(
    start: NaiveDate,
    end: NaiveDate,
    mut portfolio: Portfolio,
    directives: &[Directive],
    prices: &dyn PriceProvider,
) -> Result<SimulationResult, PsymError> {
    let snapshots_capacity = usize::try_from((end - start).num_days() + 1).unwrap_or(0);
    log::info!(
        "simulating {} directives from {} to {}",
        directives.len(),
        start,
        end
    );

    let mut cursors: Vec<(&Directive, ScheduleCursor)> = directives
        .iter()
        .map(|d| (d, d.trigger.resolve(start).occurrences(start)))
        .collect();
    let initial_value = portfolio.value(start, prices)?;
    let mut interpreter = Interpreter::new(prices);
    let mut snapshots = Vec::with_capacity(snapshots_capacity);

    for date in start.iter_days().take_while(|d| *d <= end) {
        let mut due = Vec::new();
        for (directive, cursor) in cursors.iter_mut() {
            if cursor.is_due(date) {
                due.push(*directive);
                cursor.advance();
            }
        }

        interpreter.run_day(date, &due, &mut portfolio)?;
        snapshots.push(snapshot(date, &portfolio, prices)?);
    }

    let annualized = annualized_return(initial_value, &snapshots)?;
    let breakdown = match snapshots.last() {
        Some(last) => holding_breakdown(&portfolio, last, prices)?,
        None => Vec::new(),
    };
    if let Some(last) = snapshots.last() {
        log::info!(
            "finished on {}: total ${:.2}, contributed ${:.2}, {:.2}% annualized",
            last.date,
            last.total,
            last.contributed,
            annualized
        );
    }

    Ok(SimulationResult {
        start,
        end,
        initial_value,
        snapshots,
        annualized_return: annualized,
        portfolio,
        journal: interpreter.into_journal(),
        breakdown,
    })
}

fn snapshot(
    date: NaiveDate,
    portfolio: &Portfolio,
    prices: &dyn PriceProvider,
) -> Result<ValuationSnapshot, SimulationError> {
    let holdings = portfolio.holdings_value(date, prices)?;
    Ok(ValuationSnapshot {
        date,
        cash: portfolio.cash(),
        holdings,
        total: portfolio.cash() + holdings,
        contributed: portfolio.contributed(),
    })
}

fn holding_breakdown(
    portfolio: &Portfolio,
    last: &ValuationSnapshot,
    prices: &dyn PriceProvider,
) -> Result<Vec<HoldingBreakdown>, SimulationError> {
    let pct = |value: f64| {
        if last.total > 0.0 {
            value / last.total * 100.0
        } else {
            0.0
        }
    };
    let mut rows = Vec::with_capacity(portfolio.holdings().len() + 1);
    for (ticker, shares) in portfolio.holdings() {
        let price = prices
            .price(ticker, last.date)
            .ok_or_else(|| SimulationError::PriceUnavailable {
                ticker: ticker.clone(),
                date: last.date,
            })?;
        let value = shares * price;
        rows.push(HoldingBreakdown {
            ticker: ticker.clone(),
            shares: *shares,
            value,
            pct: pct(value),
        });
    }
    rows.push(HoldingBreakdown {
        ticker: crate::domain::directive::CASH_KEY.to_string(),
        shares: 0.0,
        value: last.cash,
        pct: pct(last.cash),
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule_parser::parse;

    struct Flat(f64);

    impl PriceProvider for Flat {
        fn price(&self, _ticker: &str, _date: NaiveDate) -> Option<f64> {
            Some(self.0)
        }

        fn dividend_per_share(&self, _: &str, _: NaiveDate, _: NaiveDate) -> f64 {
            0.0
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn one_snapshot_per_calendar_day() {
        let directives = parse("2020-01-01 deposit $100").unwrap();
        let result = simulate(
            date(2020, 1, 1),
            date(2020, 1, 31),
            Portfolio::empty(),
            &directives,
            &Flat(10.0),
        )
        .unwrap();
        assert_eq!(result.snapshots.len(), 31);
        assert_eq!(result.snapshots[0].date, date(2020, 1, 1));
        assert_eq!(result.final_snapshot().unwrap().date, date(2020, 1, 31));
    }

    #[test]
    fn directives_before_start_never_fire() {
        let directives = parse("2019-06-01 deposit $100\n2020-01-10 deposit $5").unwrap();
        let result = simulate(
            date(2020, 1, 1),
            date(2020, 1, 31),
            Portfolio::new(1.0),
            &directives,
            &Flat(10.0),
        )
        .unwrap();
        assert!((result.portfolio.cash() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn breakdown_ends_with_cash() {
        let directives = parse("balance VTI: 75%, CASH: 25%").unwrap();
        let result = simulate(
            date(2020, 1, 1),
            date(2020, 12, 31),
            Portfolio::new(1000.0),
            &directives,
            &Flat(25.0),
        )
        .unwrap();
        let rows = result.breakdown();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, "VTI");
        assert!((rows[0].shares - 30.0).abs() < 1e-9);
        assert!((rows[0].pct - 75.0).abs() < 1e-9);
        assert_eq!(rows[1].ticker, "CASH");
        assert!((rows[1].value - 250.0).abs() < 1e-9);
    }

    #[test]
    fn withdraw_failure_aborts_run() {
        let directives = parse("2020-02-03 withdraw $500").unwrap();
        let err = simulate(
            date(2020, 1, 1),
            date(2020, 12, 31),
            Portfolio::new(100.0),
            &directives,
            &Flat(1.0),
        )
        .unwrap_err();
        match err {
            PsymError::Simulation(SimulationError::InsufficientCash { date: d, line, .. }) => {
                assert_eq!(d, date(2020, 2, 3));
                assert_eq!(line, 1);
            }
            other => panic!("expected insufficient cash, got {:?}", other),
        }
    }
}
