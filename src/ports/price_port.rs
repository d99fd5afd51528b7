//! Market data port trait.

use chrono::NaiveDate;

/// Read-only quote lookups used by the simulation.
///
/// Repeated calls with the same arguments must return the same value for the
/// lifetime of one run.
pub trait PriceProvider {
    /// Closing price on `date`, or `None` if there is no quote for it.
    fn price(&self, ticker: &str, date: NaiveDate) -> Option<f64>;

    /// Sum of per-share dividends with ex-date in `[start, end)`.
    fn dividend_per_share(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> f64;
}
