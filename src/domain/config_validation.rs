//! Simulation settings read from the `[simulation]` config section.
//!
//! Values are parsed into [`SimulationSettings`], command-line overrides are
//! layered on top by the CLI, and [`validate_settings`] checks the result
//! before anything is loaded.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::error::PsymError;
use crate::ports::config_port::ConfigPort;

pub const SECTION: &str = "simulation";

/// Portfolio value that seeds an empty portfolio instead of naming a file.
pub const EMPTY_PORTFOLIO: &str = "empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Text,
    Csv,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputMode::Text),
            "csv" => Ok(OutputMode::Csv),
            other => Err(format!("unknown output mode '{}', expected text or csv", other)),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Text => write!(f, "text"),
            OutputMode::Csv => write!(f, "csv"),
        }
    }
}

/// Where the initial portfolio comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PortfolioSource {
    #[default]
    Empty,
    File(PathBuf),
}

impl From<&str> for PortfolioSource {
    fn from(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(EMPTY_PORTFOLIO) {
            PortfolioSource::Empty
        } else {
            PortfolioSource::File(PathBuf::from(value))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationSettings {
    pub start_date: Option<NaiveDate>,
    /// `None` runs to the last quote of the referenced tickers.
    pub end_date: Option<NaiveDate>,
    pub portfolio: PortfolioSource,
    pub rules: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub output: OutputMode,
    /// Move the start to the first date every referenced ticker has a quote.
    pub auto_start: bool,
}

/// Read `[simulation]` into settings, rejecting malformed values.
pub fn read_settings(config: &dyn ConfigPort) -> Result<SimulationSettings, PsymError> {
    let start_date = config
        .get_string(SECTION, "start_date")
        .map(|s| parse_date(&s, "start_date"))
        .transpose()?;
    let end_date = config
        .get_string(SECTION, "end_date")
        .map(|s| parse_date(&s, "end_date"))
        .transpose()?;
    let output = match config.get_string(SECTION, "output") {
        Some(s) => s.parse::<OutputMode>().map_err(|reason| PsymError::ConfigInvalid {
            section: SECTION.to_string(),
            key: "output".to_string(),
            reason,
        })?,
        None => OutputMode::default(),
    };

    Ok(SimulationSettings {
        start_date,
        end_date,
        portfolio: config
            .get_string(SECTION, "portfolio")
            .as_deref()
            .map(PortfolioSource::from)
            .unwrap_or_default(),
        rules: non_empty_path(config.get_string(SECTION, "rules")),
        data_dir: non_empty_path(config.get_string(SECTION, "data_dir")),
        output,
        auto_start: config.get_bool(SECTION, "auto_start", false),
    })
}

/// Check that settings are complete and consistent.
pub fn validate_settings(settings: &SimulationSettings) -> Result<(), PsymError> {
    if settings.rules.is_none() {
        return Err(missing("rules"));
    }
    if settings.data_dir.is_none() {
        return Err(missing("data_dir"));
    }
    if settings.start_date.is_none() && !settings.auto_start {
        return Err(missing("start_date"));
    }
    if let (Some(start), Some(end)) = (settings.start_date, settings.end_date) {
        if start >= end {
            return Err(PsymError::ConfigInvalid {
                section: SECTION.to_string(),
                key: "start_date".to_string(),
                reason: "start_date must be before end_date".to_string(),
            });
        }
    }
    Ok(())
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate, PsymError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| PsymError::ConfigInvalid {
        section: SECTION.to_string(),
        key: field.to_string(),
        reason: format!("invalid {} format, expected YYYY-MM-DD", field),
    })
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn missing(key: &str) -> PsymError {
    PsymError::ConfigMissing {
        section: SECTION.to_string(),
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockConfig {
        data: HashMap<(String, String), String>,
    }

    impl MockConfig {
        fn new() -> Self {
            Self {
                data: HashMap::new(),
            }
        }

        fn set(&mut self, key: &str, value: &str) -> &mut Self {
            self.data
                .insert((SECTION.to_string(), key.to_string()), value.to_string());
            self
        }
    }

    impl ConfigPort for MockConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.data
                .get(&(section.to_string(), key.to_string()))
                .cloned()
        }

        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .map(|v| v == "true")
                .unwrap_or(default)
        }
    }

    fn valid_config() -> MockConfig {
        let mut config = MockConfig::new();
        config
            .set("start_date", "2000-01-01")
            .set("end_date", "2010-12-31")
            .set("portfolio", "empty")
            .set("rules", "rules.txt")
            .set("data_dir", "data");
        config
    }

    #[test]
    fn valid_config_passes() {
        let settings = read_settings(&valid_config()).unwrap();
        assert_eq!(settings.start_date, NaiveDate::from_ymd_opt(2000, 1, 1));
        assert_eq!(settings.portfolio, PortfolioSource::Empty);
        assert_eq!(settings.output, OutputMode::Text);
        assert!(!settings.auto_start);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn portfolio_path_is_a_file_source() {
        let mut config = valid_config();
        config.set("portfolio", "savings.json");
        let settings = read_settings(&config).unwrap();
        assert_eq!(
            settings.portfolio,
            PortfolioSource::File(PathBuf::from("savings.json"))
        );
    }

    #[test]
    fn bad_date_format() {
        let mut config = valid_config();
        config.set("start_date", "01/01/2000");
        let err = read_settings(&config).unwrap_err();
        assert!(matches!(err, PsymError::ConfigInvalid { ref key, .. } if key == "start_date"));
    }

    #[test]
    fn start_after_end() {
        let mut config = valid_config();
        config.set("start_date", "2011-01-01");
        let settings = read_settings(&config).unwrap();
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("before end_date"));
    }

    #[test]
    fn unknown_output_mode() {
        let mut config = valid_config();
        config.set("output", "html");
        let err = read_settings(&config).unwrap_err();
        assert!(matches!(err, PsymError::ConfigInvalid { ref key, .. } if key == "output"));
    }

    #[test]
    fn csv_output_mode() {
        let mut config = valid_config();
        config.set("output", "CSV");
        assert_eq!(read_settings(&config).unwrap().output, OutputMode::Csv);
    }

    #[test]
    fn rules_required() {
        let mut config = MockConfig::new();
        config.set("start_date", "2000-01-01").set("data_dir", "data");
        let err = validate_settings(&read_settings(&config).unwrap()).unwrap_err();
        assert!(matches!(err, PsymError::ConfigMissing { ref key, .. } if key == "rules"));
    }

    #[test]
    fn start_date_optional_with_auto_start() {
        let mut config = MockConfig::new();
        config
            .set("rules", "r.txt")
            .set("data_dir", "data")
            .set("auto_start", "true");
        let settings = read_settings(&config).unwrap();
        assert!(settings.auto_start);
        assert!(validate_settings(&settings).is_ok());

        let mut config = MockConfig::new();
        config.set("rules", "r.txt").set("data_dir", "data");
        let err = validate_settings(&read_settings(&config).unwrap()).unwrap_err();
        assert!(matches!(err, PsymError::ConfigMissing { ref key, .. } if key == "start_date"));
    }

    #[test]
    fn empty_sentinel_is_case_insensitive() {
        assert_eq!(PortfolioSource::from("EMPTY"), PortfolioSource::Empty);
        assert_eq!(PortfolioSource::from(""), PortfolioSource::Empty);
    }
}
