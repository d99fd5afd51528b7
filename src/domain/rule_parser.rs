//! Rule-file parser.
//!
//! Single left-to-right pass over the lines of a rule file. Each non-blank
//! line is read by a small cursor parser that reports errors with line and
//! column; consecutive `balance` lines are merged into one allocation block
//! before being emitted as a `SetAllocation` directive.
//!
//! ```text
//! line      := [date [recurrence]] verb args
//! recurrence:= '[' [count 'x'] code ']'
//! deposit   := date [recurrence] ("deposit" | "withdraw") '$' number ['k' | 'm']
//! balance   := [date [recurrence]] "balance" target (',' target)*
//! target    := TICKER ':' percent
//! dividends := [date] "dividends" ["on" | "off"] [recurrence]
//! interest  := [date [recurrence]] "cash-interest" percent
//! ```

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::directive::{
    ALLOCATION_TOLERANCE_PCT, AllocationTarget, Directive, DirectiveKind, Trigger,
};
use crate::domain::error::{AllocationError, ParseError, RuleFileError};
use crate::domain::schedule::Recurrence;

/// Cadence of dividend accrual when a `dividends` line names none.
pub const DEFAULT_DIVIDEND_ACCRUAL: Recurrence = Recurrence::MonthStart;

/// Cadence of cash interest when a `cash-interest` line names none.
pub const DEFAULT_INTEREST_CADENCE: Recurrence = Recurrence::BusinessMonthStart;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RecurrenceSpec {
    recurrence: Recurrence,
    count: Option<u32>,
    column: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct TargetSpec {
    ticker: String,
    weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Line {
    /// A date with no verb: anchors the next balance block.
    Anchor {
        date: NaiveDate,
        rebalance: Option<Recurrence>,
    },
    Balance {
        head: Option<(NaiveDate, Option<Recurrence>)>,
        targets: Vec<TargetSpec>,
    },
    Directive(Trigger, DirectiveKind),
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, line: usize) -> Self {
        Self {
            input,
            pos: 0,
            line,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.input.len()
    }

    fn error_at(&self, message: impl Into<String>, column: usize) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
            column,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(message, self.pos)
    }

    fn found(&self) -> String {
        let word = self.peek_word();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of line".to_string())
        } else {
            word.to_string()
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of line", expected))),
        }
    }

    fn peek_word(&self) -> &'a str {
        let rest = self.remaining();
        let end = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn parse_word(&mut self) -> &'a str {
        self.skip_whitespace();
        let word = self.peek_word();
        self.pos += word.len();
        word
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            self.pos = start;
            return Err(self.error(format!("expected number, found '{}'", self.found())));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error_at(format!("invalid number: {}", num_str), start))
    }

    fn parse_integer(&mut self) -> Result<u32, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let num_str = &self.input[start..self.pos];
        if num_str.is_empty() {
            return Err(self.error("expected integer"));
        }
        num_str
            .parse::<u32>()
            .map_err(|_| self.error_at(format!("invalid integer: {}", num_str), start))
    }

    fn try_parse_date(&mut self) -> Result<Option<NaiveDate>, ParseError> {
        self.skip_whitespace();
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
        let start = self.pos;
        let rest = self.remaining();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '[')
            .unwrap_or(rest.len());
        let token = &rest[..end];
        let date = NaiveDate::parse_from_str(token, "%Y-%m-%d").map_err(|_| {
            self.error_at(format!("invalid date '{}', expected YYYY-MM-DD", token), start)
        })?;
        self.pos += end;
        Ok(Some(date))
    }

    /// `[code]`, `[12xcode]` or `[ 12 x code ]`, if present.
    fn try_parse_recurrence(&mut self) -> Result<Option<RecurrenceSpec>, ParseError> {
        self.skip_whitespace();
        if self.peek() != Some('[') {
            return Ok(None);
        }
        let column = self.pos;
        self.advance();
        self.skip_whitespace();

        let mut count = None;
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let n = self.parse_integer()?;
            if n == 0 {
                return Err(self.error_at("repetition count must be positive", column));
            }
            self.skip_whitespace();
            match self.peek() {
                Some('x') | Some('X') => {
                    self.advance();
                }
                _ => return Err(self.error(format!("expected 'x', found '{}'", self.found()))),
            }
            count = Some(n);
        }

        self.skip_whitespace();
        let code_start = self.pos;
        let code = self.parse_word();
        if code.is_empty() {
            return Err(self.error(format!("expected recurrence code, found '{}'", self.found())));
        }
        let recurrence = code
            .parse::<Recurrence>()
            .map_err(|e| self.error_at(e.to_string(), code_start))?;
        self.expect_char(']')?;

        Ok(Some(RecurrenceSpec {
            recurrence,
            count,
            column,
        }))
    }

    /// `$<number>[k|m]`, strictly positive.
    fn parse_dollars(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.peek() != Some('$') {
            return Err(self.error(format!("expected '$' amount, found '{}'", self.found())));
        }
        self.advance();
        if self.peek() == Some('-') {
            return Err(self.error_at("amount must be positive", start));
        }
        let mut amount = self.parse_number()?;
        match self.peek() {
            Some('k') | Some('K') => {
                self.advance();
                amount *= 1_000.0;
            }
            Some('m') | Some('M') => {
                self.advance();
                amount *= 1_000_000.0;
            }
            _ => {}
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric()) {
            return Err(self.error(format!(
                "invalid amount unit '{}', expected k, m or none",
                self.found()
            )));
        }
        if amount <= 0.0 {
            return Err(self.error_at("amount must be positive", start));
        }
        Ok(amount)
    }

    /// `40%` or a fraction such as `0.4`; returned as a fraction in [0, 1].
    fn parse_percent(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let number = self.parse_number()?;
        let value = if self.peek() == Some('%') {
            self.advance();
            number / 100.0
        } else {
            number
        };
        if !(0.0..=1.0).contains(&value) {
            return Err(self.error_at(
                format!("percentage {} should be between 0% and 100%", value * 100.0),
                start,
            ));
        }
        Ok(value)
    }

    fn parse_targets(&mut self) -> Result<Vec<TargetSpec>, ParseError> {
        let mut targets = Vec::new();
        loop {
            self.skip_whitespace();
            let ticker = self.parse_word();
            if ticker.is_empty() {
                return Err(self.error(format!("expected ticker, found '{}'", self.found())));
            }
            self.expect_char(':')?;
            let weight = self.parse_percent()?;
            targets.push(TargetSpec {
                ticker: ticker.to_uppercase(),
                weight,
            });
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.advance();
            } else {
                break;
            }
        }
        Ok(targets)
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected input: '{}'", self.remaining().trim_end())))
        }
    }

    fn parse_line(&mut self) -> Result<Line, ParseError> {
        let date = self.try_parse_date()?;
        let prefix = match date {
            Some(_) => self.try_parse_recurrence()?,
            None => None,
        };

        if self.at_end() {
            let date = date.ok_or_else(|| self.error("expected directive"))?;
            if let Some(spec) = prefix.filter(|s| s.count.is_some()) {
                return Err(self.error_at("a balance cadence cannot have a count", spec.column));
            }
            return Ok(Line::Anchor {
                date,
                rebalance: prefix.map(|s| s.recurrence),
            });
        }

        let verb_start = self.pos;
        let verb = self.parse_word();
        match verb {
            "deposit" | "withdraw" => {
                let anchor = date.ok_or_else(|| {
                    self.error_at(format!("{} requires a start date", verb), verb_start)
                })?;
                let total = self.parse_dollars()?;
                self.expect_end()?;
                let (recurrence, count) = prefix
                    .map(|s| (s.recurrence, s.count))
                    .unwrap_or((Recurrence::OneShot, None));
                let amount = match count {
                    Some(n) => total / f64::from(n),
                    None => total,
                };
                let kind = if verb == "deposit" {
                    DirectiveKind::Deposit { amount }
                } else {
                    DirectiveKind::Withdraw { amount }
                };
                Ok(Line::Directive(
                    Trigger {
                        anchor: Some(anchor),
                        recurrence,
                        count,
                    },
                    kind,
                ))
            }
            "balance" => {
                if let Some(spec) = prefix.filter(|s| s.count.is_some()) {
                    return Err(self.error_at("a balance cadence cannot have a count", spec.column));
                }
                let targets = self.parse_targets()?;
                self.expect_end()?;
                Ok(Line::Balance {
                    head: date.map(|d| (d, prefix.map(|s| s.recurrence))),
                    targets,
                })
            }
            "dividends" => {
                let enabled = match self.peek_word_after_whitespace() {
                    "on" => {
                        self.parse_word();
                        true
                    }
                    "off" => {
                        self.parse_word();
                        false
                    }
                    _ => true,
                };
                let suffix = self.try_parse_recurrence()?;
                self.expect_end()?;
                let accrual = match (prefix, suffix) {
                    (Some(_), Some(s)) => {
                        return Err(
                            self.error_at("accrual cadence given twice", s.column)
                        );
                    }
                    (Some(s), None) | (None, Some(s)) => {
                        if s.count.is_some() {
                            return Err(
                                self.error_at("dividend accrual cannot have a count", s.column)
                            );
                        }
                        s.recurrence
                    }
                    (None, None) => DEFAULT_DIVIDEND_ACCRUAL,
                };
                let trigger = match date {
                    Some(d) => Trigger::on(d),
                    None => Trigger::at_start(),
                };
                Ok(Line::Directive(
                    trigger,
                    DirectiveKind::ToggleDividends { enabled, accrual },
                ))
            }
            "cash-interest" => {
                let yearly_rate = self.parse_percent()?;
                self.expect_end()?;
                let (recurrence, count) = prefix
                    .map(|s| (s.recurrence, s.count))
                    .unwrap_or((DEFAULT_INTEREST_CADENCE, None));
                Ok(Line::Directive(
                    Trigger {
                        anchor: date,
                        recurrence,
                        count,
                    },
                    DirectiveKind::CashInterest { yearly_rate },
                ))
            }
            "" => Err(self.error_at(
                format!("expected directive, found '{}'", self.found()),
                verb_start,
            )),
            other => Err(self.error_at(format!("unknown directive '{}'", other), verb_start)),
        }
    }

    fn peek_word_after_whitespace(&mut self) -> &'a str {
        self.skip_whitespace();
        self.peek_word()
    }
}

/// Accumulates consecutive `balance` lines.
struct BalanceBlock {
    line: usize,
    anchor: Option<NaiveDate>,
    rebalance: Option<Recurrence>,
    weights: BTreeMap<String, f64>,
}

impl BalanceBlock {
    fn new(line: usize, anchor: Option<NaiveDate>, rebalance: Option<Recurrence>) -> Self {
        BalanceBlock {
            line,
            anchor,
            rebalance,
            weights: BTreeMap::new(),
        }
    }

    fn add(&mut self, line: usize, targets: Vec<TargetSpec>) -> Result<(), AllocationError> {
        for t in targets {
            if self.weights.contains_key(&t.ticker) {
                return Err(AllocationError::DuplicateTicker {
                    line,
                    ticker: t.ticker,
                });
            }
            self.weights.insert(t.ticker, t.weight);
        }
        Ok(())
    }

    fn finish(self) -> Result<Directive, AllocationError> {
        if self.weights.is_empty() {
            return Err(AllocationError::Empty { line: self.line });
        }
        let target = AllocationTarget::new(self.weights);
        let total_pct = target.total_pct();
        if (total_pct - 100.0).abs() > ALLOCATION_TOLERANCE_PCT {
            return Err(AllocationError::BadTotal {
                line: self.line,
                total_pct,
            });
        }
        let trigger = match self.anchor {
            Some(d) => Trigger::on(d),
            None => Trigger::at_start(),
        };
        Ok(Directive {
            line: self.line,
            trigger,
            kind: DirectiveKind::SetAllocation {
                target,
                rebalance: self.rebalance,
            },
        })
    }
}

/// A bare date line waiting for its balance block.
struct PendingAnchor {
    line: usize,
    date: NaiveDate,
    rebalance: Option<Recurrence>,
}

impl PendingAnchor {
    fn dangling(&self) -> ParseError {
        ParseError {
            message: "date line is not followed by a balance block".to_string(),
            line: self.line,
            column: 0,
        }
    }
}

fn flush(
    block: &mut Option<BalanceBlock>,
    directives: &mut Vec<Directive>,
) -> Result<(), AllocationError> {
    if let Some(b) = block.take() {
        directives.push(b.finish()?);
    }
    Ok(())
}

/// Parse rule-file text into directives in source order.
pub fn parse(source: &str) -> Result<Vec<Directive>, RuleFileError> {
    let mut directives = Vec::new();
    let mut block: Option<BalanceBlock> = None;
    let mut pending: Option<PendingAnchor> = None;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            flush(&mut block, &mut directives)?;
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let code = raw.split('#').next().unwrap_or_default();

        match Parser::new(code, line_no).parse_line()? {
            Line::Anchor { date, rebalance } => {
                flush(&mut block, &mut directives)?;
                if let Some(p) = pending.take() {
                    return Err(p.dangling().into());
                }
                pending = Some(PendingAnchor {
                    line: line_no,
                    date,
                    rebalance,
                });
            }
            Line::Balance { head, targets } => {
                if let Some((date, rebalance)) = head {
                    flush(&mut block, &mut directives)?;
                    if let Some(p) = pending.take() {
                        return Err(p.dangling().into());
                    }
                    block = Some(BalanceBlock::new(line_no, Some(date), rebalance));
                } else if block.is_none() {
                    block = Some(match pending.take() {
                        Some(p) => BalanceBlock::new(line_no, Some(p.date), p.rebalance),
                        None => BalanceBlock::new(line_no, None, None),
                    });
                }
                if let Some(b) = block.as_mut() {
                    b.add(line_no, targets)?;
                }
            }
            Line::Directive(trigger, kind) => {
                flush(&mut block, &mut directives)?;
                if let Some(p) = pending.take() {
                    return Err(p.dangling().into());
                }
                directives.push(Directive {
                    line: line_no,
                    trigger,
                    kind,
                });
            }
        }
    }

    flush(&mut block, &mut directives)?;
    if let Some(p) = pending {
        return Err(p.dangling().into());
    }
    Ok(directives)
}
