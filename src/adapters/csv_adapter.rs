//! CSV quote file adapter.
//!
//! Each ticker lives in `<data_dir>/<TICKER>.csv` with a header row and the
//! columns `date,close[,dividends]`.

use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::adapters::price_table::PriceTable;
use crate::domain::error::PsymError;

#[derive(Debug, Deserialize)]
struct QuoteRow {
    date: NaiveDate,
    close: f64,
    #[serde(default)]
    dividends: Option<f64>,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker.to_uppercase()))
    }

    /// Read one ticker's file into `table`, returning the number of rows kept.
    pub fn load_ticker(&self, ticker: &str, table: &mut PriceTable) -> Result<usize, PsymError> {
        let path = self.csv_path(ticker);
        let content = fs::read_to_string(&path).map_err(|e| PsymError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = 0;

        for (index, result) in rdr.deserialize::<QuoteRow>().enumerate() {
            let row = result.map_err(|e| PsymError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            // A dividend stands on its own even when the close is unusable.
            if let Some(dividend) = row.dividends.filter(|d| *d > 0.0) {
                table.insert_dividend(ticker, row.date, dividend);
            }
            if !row.close.is_finite() || row.close <= 0.0 {
                log::warn!(
                    "{}: skipping close {} on row {}{}",
                    path.display(),
                    row.close,
                    index + 2,
                    if row.dividends.is_some_and(|d| d > 0.0) {
                        " (dividend kept)"
                    } else {
                        ""
                    }
                );
                continue;
            }
            if table.insert_close(ticker, row.date, row.close).is_some() {
                log::warn!("{}: duplicate row for {}", path.display(), row.date);
            }
            rows += 1;
        }

        if rows == 0 {
            log::warn!("{}: no usable quotes", path.display());
        }
        log::debug!("loaded {} rows for {}", rows, ticker);
        Ok(rows)
    }

    /// Load every ticker into a fresh table.
    pub fn load<'t>(&self, tickers: impl IntoIterator<Item = &'t str>) -> Result<PriceTable, PsymError> {
        let mut table = PriceTable::new();
        for ticker in tickers {
            self.load_ticker(ticker, &mut table)?;
        }
        Ok(table)
    }

    /// Tickers with a CSV file in the data directory, sorted.
    pub fn list_tickers(&self) -> Result<Vec<String>, PsymError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PsymError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PsymError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(ticker) = name_str.strip_suffix(".csv") {
                tickers.push(ticker.to_uppercase());
            }
        }

        tickers.sort();
        Ok(tickers)
    }
}
