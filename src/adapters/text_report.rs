//! Plain-text report: summary header, per-holding breakdown, optional journal.

use std::io::Write;

use crate::domain::error::PsymError;
use crate::domain::simulation::SimulationResult;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextReport {
    pub show_journal: bool,
}

impl TextReport {
    pub fn new(show_journal: bool) -> Self {
        Self { show_journal }
    }
}

/// `$1,234.56` with thousands separators.
pub fn format_dollars(amount: f64) -> String {
    let cents = format!("{:.2}", amount.abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, frac)
}

impl ReportPort for TextReport {
    fn write(&self, result: &SimulationResult, out: &mut dyn Write) -> Result<(), PsymError> {
        let Some(last) = result.final_snapshot() else {
            writeln!(out, "{} .. {}: no days simulated", result.start, result.end)?;
            return Ok(());
        };

        if let Some(name) = &result.portfolio.name {
            writeln!(out, "{}", name)?;
        }
        writeln!(
            out,
            "{} .. {}  total {}  contributed {}  return {:.2}%",
            result.start,
            last.date,
            format_dollars(last.total),
            format_dollars(last.contributed),
            result.annualized_return
        )?;

        for row in result.breakdown() {
            if row.shares > 0.0 {
                writeln!(
                    out,
                    "  {:<8} {:>14} {:>14.4} sh {:>7.2}%",
                    row.ticker,
                    format_dollars(row.value),
                    row.shares,
                    row.pct
                )?;
            } else {
                writeln!(
                    out,
                    "  {:<8} {:>14} {:>17} {:>7.2}%",
                    row.ticker,
                    format_dollars(row.value),
                    "",
                    row.pct
                )?;
            }
        }

        if self.show_journal && !result.journal.is_empty() {
            writeln!(out)?;
            writeln!(out, "Journal:")?;
            for entry in &result.journal {
                writeln!(out, "  {}", entry)?;
            }
        }
        Ok(())
    }
}
