//! In-memory quote table implementing [`PriceProvider`].

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::ports::price_port::PriceProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
struct Series {
    closes: BTreeMap<NaiveDate, f64>,
    dividends: BTreeMap<NaiveDate, f64>,
}

/// Daily closes and dividends keyed by upper-case ticker.
///
/// Prices are forward-filled: a date without a row uses the most recent
/// earlier close. Dates before the first row have no price.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    series: BTreeMap<String, Series>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a close; a second close for the same date replaces the first.
    pub fn insert_close(&mut self, ticker: &str, date: NaiveDate, close: f64) -> Option<f64> {
        self.series
            .entry(ticker.to_uppercase())
            .or_default()
            .closes
            .insert(date, close)
    }

    /// Record a dividend with ex-date `date`; amounts on one date accumulate.
    pub fn insert_dividend(&mut self, ticker: &str, date: NaiveDate, per_share: f64) {
        *self
            .series
            .entry(ticker.to_uppercase())
            .or_default()
            .dividends
            .entry(date)
            .or_insert(0.0) += per_share;
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.series
            .get(ticker)
            .is_some_and(|s| !s.closes.is_empty())
    }

    pub fn data_range(&self, ticker: &str) -> Option<DataRange> {
        let closes = &self.series.get(ticker)?.closes;
        let (first, _) = closes.first_key_value()?;
        let (last, _) = closes.last_key_value()?;
        Some(DataRange {
            first: *first,
            last: *last,
            rows: closes.len(),
        })
    }

    /// First date on which every one of `tickers` has a quote.
    pub fn common_start<'t>(&self, tickers: impl IntoIterator<Item = &'t str>) -> Option<NaiveDate> {
        let mut start = None;
        for ticker in tickers {
            let first = self.data_range(ticker)?.first;
            start = Some(start.map_or(first, |s: NaiveDate| s.max(first)));
        }
        start
    }

    /// Latest quote date among `tickers`.
    pub fn last_date<'t>(&self, tickers: impl IntoIterator<Item = &'t str>) -> Option<NaiveDate> {
        tickers
            .into_iter()
            .filter_map(|t| self.data_range(t))
            .map(|r| r.last)
            .max()
    }
}

impl PriceProvider for PriceTable {
    fn price(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.series
            .get(ticker)?
            .closes
            .range(..=date)
            .next_back()
            .map(|(_, close)| *close)
    }

    fn dividend_per_share(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> f64 {
        if start >= end {
            return 0.0;
        }
        self.series
            .get(ticker)
            .map(|s| s.dividends.range(start..end).map(|(_, d)| d).sum())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> PriceTable {
        let mut table = PriceTable::new();
        table.insert_close("vti", date(2020, 1, 2), 100.0);
        table.insert_close("VTI", date(2020, 1, 3), 101.0);
        table.insert_close("VTI", date(2020, 1, 6), 99.0);
        table.insert_close("QQQ", date(2020, 1, 6), 200.0);
        table.insert_dividend("VTI", date(2020, 1, 3), 0.25);
        table.insert_dividend("VTI", date(2020, 1, 6), 0.5);
        table
    }

    #[test]
    fn price_on_quote_day() {
        assert_eq!(sample().price("VTI", date(2020, 1, 3)), Some(101.0));
    }

    #[test]
    fn price_forward_fills_weekend() {
        let table = sample();
        assert_eq!(table.price("VTI", date(2020, 1, 4)), Some(101.0));
        assert_eq!(table.price("VTI", date(2020, 1, 5)), Some(101.0));
        assert_eq!(table.price("VTI", date(2030, 1, 1)), Some(99.0));
    }

    #[test]
    fn price_before_first_quote_is_missing() {
        let table = sample();
        assert_eq!(table.price("VTI", date(2020, 1, 1)), None);
        assert_eq!(table.price("QQQ", date(2020, 1, 5)), None);
        assert_eq!(table.price("XYZ", date(2020, 1, 5)), None);
    }

    #[test]
    fn dividends_use_half_open_period() {
        let table = sample();
        assert_eq!(table.dividend_per_share("VTI", date(2020, 1, 1), date(2020, 1, 6)), 0.25);
        assert_eq!(table.dividend_per_share("VTI", date(2020, 1, 3), date(2020, 1, 7)), 0.75);
        assert_eq!(table.dividend_per_share("VTI", date(2020, 1, 6), date(2020, 1, 6)), 0.0);
        assert_eq!(table.dividend_per_share("VTI", date(2020, 1, 7), date(2020, 1, 1)), 0.0);
        assert_eq!(table.dividend_per_share("QQQ", date(2020, 1, 1), date(2021, 1, 1)), 0.0);
    }

    #[test]
    fn ranges() {
        let table = sample();
        assert_eq!(
            table.data_range("VTI"),
            Some(DataRange {
                first: date(2020, 1, 2),
                last: date(2020, 1, 6),
                rows: 3
            })
        );
        assert_eq!(table.common_start(["VTI", "QQQ"]), Some(date(2020, 1, 6)));
        assert_eq!(table.common_start(["VTI", "XYZ"]), None);
        assert_eq!(table.last_date(["VTI", "QQQ"]), Some(date(2020, 1, 6)));
    }
}
