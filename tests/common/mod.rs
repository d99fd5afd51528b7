#![allow(dead_code)]

use chrono::NaiveDate;
use psym::adapters::price_table::PriceTable;
use std::fs;
use std::path::Path;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One close per calendar day from `start` to `end`, priced by `price`.
pub fn daily_table(
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    price: impl Fn(NaiveDate) -> f64,
) -> PriceTable {
    let mut table = PriceTable::new();
    add_daily(&mut table, ticker, start, end, price);
    table
}

pub fn add_daily(
    table: &mut PriceTable,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    price: impl Fn(NaiveDate) -> f64,
) {
    for day in start.iter_days().take_while(|d| *d <= end) {
        table.insert_close(ticker, day, price(day));
    }
}

/// Constant-price table for several tickers.
pub fn flat_table(tickers: &[(&str, f64)], start: NaiveDate, end: NaiveDate) -> PriceTable {
    let mut table = PriceTable::new();
    for (ticker, price) in tickers {
        add_daily(&mut table, ticker, start, end, |_| *price);
    }
    table
}

/// Write `<TICKER>.csv` files with a constant close for every day in range.
pub fn write_flat_csv(dir: &Path, ticker: &str, price: f64, start: NaiveDate, end: NaiveDate) {
    let mut content = String::from("date,close,dividends\n");
    for day in start.iter_days().take_while(|d| *d <= end) {
        content.push_str(&format!("{},{},\n", day, price));
    }
    fs::write(dir.join(format!("{}.csv", ticker)), content).unwrap();
}

pub const SAVINGS_RULES: &str = "\
# Monthly savings into a total-market fund
dividends
2000-01-01 [BMS] deposit $100
balance VTI: 100%
";

/// VTI at a flat $50 through 2000 with a single $0.50 dividend in June.
pub fn savings_table() -> PriceTable {
    let mut table = flat_table(&[("VTI", 50.0)], date(1999, 12, 31), date(2000, 12, 31));
    table.insert_dividend("VTI", date(2000, 6, 15), 0.5);
    table
}
