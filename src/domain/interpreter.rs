//! Rule interpreter: applies due directives to a portfolio, one day at a time.
//!
//! Within a day the order is fixed: directives sorted by kind precedence then
//! source line, followed by the rebalance pass and finally dividend accrual.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;

use super::directive::{AllocationTarget, Directive, DirectiveKind};
use super::error::SimulationError;
use super::portfolio::Portfolio;
use super::schedule::{Schedule, ScheduleCursor};
use crate::ports::price_port::PriceProvider;

/// Dollar deviations at or below this count as on target.
pub const REBALANCE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JournalKind {
    Deposit,
    Withdraw,
    Buy,
    Sell,
    Dividend,
    Interest,
}

impl fmt::Display for JournalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JournalKind::Deposit => "deposit",
            JournalKind::Withdraw => "withdraw",
            JournalKind::Buy => "buy",
            JournalKind::Sell => "sell",
            JournalKind::Dividend => "dividend",
            JournalKind::Interest => "interest",
        };
        f.pad(s)
    }
}

/// One cash or share movement.
///
/// `amount` is the absolute dollar value moved; `shares` is zero for pure
/// cash events.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub date: NaiveDate,
    pub kind: JournalKind,
    pub ticker: Option<String>,
    pub shares: f64,
    pub amount: f64,
}

impl JournalEntry {
    fn cash(date: NaiveDate, kind: JournalKind, amount: f64) -> Self {
        JournalEntry {
            date,
            kind,
            ticker: None,
            shares: 0.0,
            amount,
        }
    }
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ticker {
            Some(t) => write!(
                f,
                "{} {:<8} {:<6} {:>12.4} sh ${:.2}",
                self.date, self.kind, t, self.shares, self.amount
            ),
            None => write!(f, "{} {:<8} ${:.2}", self.date, self.kind, self.amount),
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveAllocation {
    target: AllocationTarget,
    line: usize,
    /// `None` rebalances every day.
    cadence: Option<ScheduleCursor>,
}

#[derive(Debug, Clone)]
struct DividendTracking {
    cursor: ScheduleCursor,
    period_start: NaiveDate,
}

/// Run-scoped state changed only by `balance` and `dividends` directives.
#[derive(Debug, Clone, Default)]
pub struct InterpreterState {
    allocation: Option<ActiveAllocation>,
    dividends: Option<DividendTracking>,
}

impl InterpreterState {
    pub fn allocation(&self) -> Option<&AllocationTarget> {
        self.allocation.as_ref().map(|a| &a.target)
    }

    pub fn dividends_enabled(&self) -> bool {
        self.dividends.is_some()
    }
}

pub struct Interpreter<'a> {
    prices: &'a dyn PriceProvider,
    state: InterpreterState,
    journal: Vec<JournalEntry>,
}

impl<'a> Interpreter<'a> {
    pub fn new(prices: &'a dyn PriceProvider) -> Self {
        Interpreter {
            prices,
            state: InterpreterState::default(),
            journal: Vec::new(),
        }
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn into_journal(self) -> Vec<JournalEntry> {
        self.journal
    }

    /// Apply everything that happens on `date`.
    pub fn run_day(
        &mut self,
        date: NaiveDate,
        due: &[&Directive],
        portfolio: &mut Portfolio,
    ) -> Result<(), SimulationError> {
        let mut ordered = due.to_vec();
        ordered.sort_by_key(|d| (d.kind.precedence(), d.line));

        for directive in ordered {
            self.apply(date, directive, portfolio)?;
        }
        self.rebalance_if_due(date, portfolio)?;
        self.accrue_dividends_if_due(date, portfolio)?;
        Ok(())
    }

    fn apply(
        &mut self,
        date: NaiveDate,
        directive: &Directive,
        portfolio: &mut Portfolio,
    ) -> Result<(), SimulationError> {
        log::debug!("{}: applying {}", date, directive);
        match &directive.kind {
            DirectiveKind::ToggleDividends { enabled, accrual } => {
                self.state.dividends = enabled.then(|| DividendTracking {
                    cursor: Schedule::every(date, *accrual).occurrences(date),
                    period_start: date,
                });
            }
            DirectiveKind::SetAllocation { target, rebalance } => {
                self.state.allocation = Some(ActiveAllocation {
                    target: target.clone(),
                    line: directive.line,
                    cadence: rebalance.map(|r| Schedule::every(date, r).occurrences(date)),
                });
            }
            DirectiveKind::Deposit { amount } => {
                portfolio.deposit(*amount);
                self.journal
                    .push(JournalEntry::cash(date, JournalKind::Deposit, *amount));
            }
            DirectiveKind::Withdraw { amount } => {
                portfolio.withdraw(*amount, date, directive.line)?;
                self.journal
                    .push(JournalEntry::cash(date, JournalKind::Withdraw, *amount));
            }
            DirectiveKind::CashInterest { yearly_rate } => {
                let interest = portfolio.cash() * yearly_rate / 12.0;
                if interest > 0.0 {
                    portfolio.credit_income(interest);
                    self.journal
                        .push(JournalEntry::cash(date, JournalKind::Interest, interest));
                }
            }
        }
        Ok(())
    }

    fn rebalance_if_due(
        &mut self,
        date: NaiveDate,
        portfolio: &mut Portfolio,
    ) -> Result<(), SimulationError> {
        let Some(active) = self.state.allocation.as_mut() else {
            return Ok(());
        };
        let due = match active.cadence.as_mut() {
            None => true,
            Some(cursor) => {
                let mut hit = false;
                while cursor.peek().is_some_and(|d| d <= date) {
                    cursor.advance();
                    hit = true;
                }
                hit
            }
        };
        if !due {
            return Ok(());
        }
        let trades = rebalance(&active.target, date, active.line, portfolio, self.prices)?;
        self.journal.extend(trades);
        Ok(())
    }

    fn accrue_dividends_if_due(
        &mut self,
        date: NaiveDate,
        portfolio: &mut Portfolio,
    ) -> Result<(), SimulationError> {
        let Some(tracking) = self.state.dividends.as_mut() else {
            return Ok(());
        };
        if !tracking.cursor.is_due(date) {
            return Ok(());
        }
        tracking.cursor.advance();
        let period_start = std::mem::replace(&mut tracking.period_start, date);

        let held: Vec<(String, f64)> = portfolio
            .holdings()
            .iter()
            .map(|(t, s)| (t.clone(), *s))
            .collect();
        for (ticker, shares) in held {
            let per_share = self.prices.dividend_per_share(&ticker, period_start, date);
            let amount = shares * per_share;
            if amount > 0.0 {
                log::debug!(
                    "{}: dividend {} x ${:.4} on {} = ${:.2}",
                    date,
                    shares,
                    per_share,
                    ticker,
                    amount
                );
                portfolio.credit_income(amount);
                self.journal.push(JournalEntry {
                    date,
                    kind: JournalKind::Dividend,
                    ticker: Some(ticker),
                    shares,
                    amount,
                });
            }
        }
        Ok(())
    }
}

struct Deviation {
    ticker: String,
    price: f64,
    /// Target value minus current value.
    gap: f64,
}

/// Trade `portfolio` toward `target` at the prices of `date`.
///
/// Sells run first, largest over-allocation first; buys follow, largest
/// under-allocation first, until the budget (cash above the `CASH` target) is
/// spent. Equal gaps are ordered by ticker. Does nothing when the portfolio
/// has no value.
pub fn rebalance(
    target: &AllocationTarget,
    date: NaiveDate,
    line: usize,
    portfolio: &mut Portfolio,
    prices: &dyn PriceProvider,
) -> Result<Vec<JournalEntry>, SimulationError> {
    let total = portfolio.value(date, prices)?;
    if total <= 0.0 {
        return Ok(Vec::new());
    }

    let tickers: BTreeSet<&str> = target
        .tickers()
        .chain(portfolio.holdings().keys().map(String::as_str))
        .collect();

    let mut deviations = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let price = prices
            .price(ticker, date)
            .ok_or_else(|| SimulationError::PriceUnavailable {
                ticker: ticker.to_string(),
                date,
            })?;
        let current = portfolio.shares(ticker) * price;
        deviations.push(Deviation {
            ticker: ticker.to_string(),
            price,
            gap: target.weight(ticker) * total - current,
        });
    }

    let (mut sells, mut buys): (Vec<Deviation>, Vec<Deviation>) = deviations
        .into_iter()
        .filter(|d| d.gap.abs() > REBALANCE_TOLERANCE)
        .partition(|d| d.gap < 0.0);
    // Stable sorts keep ticker order for equal gaps.
    sells.sort_by(|a, b| a.gap.total_cmp(&b.gap));
    buys.sort_by(|a, b| b.gap.total_cmp(&a.gap));

    let mut trades = Vec::new();
    for sell in sells {
        let held = portfolio.shares(&sell.ticker);
        let shares = if target.weight(&sell.ticker) == 0.0 {
            held
        } else {
            (-sell.gap / sell.price).min(held)
        };
        if shares <= 0.0 {
            continue;
        }
        let proceeds = -portfolio.trade(&sell.ticker, -shares, sell.price, date, line)?;
        log::debug!("{}: sell {:.6} {} for ${:.2}", date, shares, sell.ticker, proceeds);
        trades.push(JournalEntry {
            date,
            kind: JournalKind::Sell,
            ticker: Some(sell.ticker),
            shares,
            amount: proceeds,
        });
    }

    let mut budget = (portfolio.cash() - target.cash_weight() * total).max(0.0);
    for buy in buys {
        let spend = buy.gap.min(budget);
        if spend <= REBALANCE_TOLERANCE {
            break;
        }
        let shares = spend / buy.price;
        let cost = portfolio.trade(&buy.ticker, shares, buy.price, date, line)?;
        budget -= cost;
        log::debug!("{}: buy {:.6} {} for ${:.2}", date, shares, buy.ticker, cost);
        trades.push(JournalEntry {
            date,
            kind: JournalKind::Buy,
            ticker: Some(buy.ticker),
            shares,
            amount: cost,
        });
    }

    Ok(trades)
}
