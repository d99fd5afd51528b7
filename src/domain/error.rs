//! Domain error types.

use chrono::NaiveDate;

/// A syntax error in a rule file, located by line and column.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    /// Format the error with the offending source line and a caret under the column.
    pub fn display_with_context(&self, source: &str) -> String {
        let text = source
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or_default();
        let caret = " ".repeat(self.column) + "^";
        format!("{text}\n{caret}\n{err}", text = text, caret = caret, err = self)
    }
}

/// A `balance` block that does not describe a valid allocation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationError {
    #[error("line {line}: allocation sums to {total_pct:.4}%, expected 100%")]
    BadTotal { line: usize, total_pct: f64 },

    #[error("line {line}: ticker {ticker} appears twice in one balance block")]
    DuplicateTicker { line: usize, ticker: String },

    #[error("line {line}: balance block has no targets")]
    Empty { line: usize },
}

impl AllocationError {
    pub fn line(&self) -> usize {
        match self {
            AllocationError::BadTotal { line, .. }
            | AllocationError::DuplicateTicker { line, .. }
            | AllocationError::Empty { line } => *line,
        }
    }
}

/// Anything that stops a rule file from turning into directives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleFileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl RuleFileError {
    pub fn line(&self) -> usize {
        match self {
            RuleFileError::Parse(e) => e.line,
            RuleFileError::Allocation(e) => e.line(),
        }
    }
}

/// Fatal conditions raised while a simulation is running.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error(
        "insufficient cash on {date} (rule line {line}): requested ${requested:.2}, available ${available:.2}"
    )]
    InsufficientCash {
        date: NaiveDate,
        line: usize,
        requested: f64,
        available: f64,
    },

    #[error("no price for {ticker} on {date}")]
    PriceUnavailable { ticker: String, date: NaiveDate },

    #[error("trade of {delta} {ticker} shares would leave a negative position (held {held})")]
    NegativeShares { ticker: String, held: f64, delta: f64 },
}

/// The annualized return is undefined for the recorded history.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("annualized return undefined: {reason}")]
pub struct DegenerateRangeError {
    pub reason: String,
}

/// Top-level error type for psym.
#[derive(Debug, thiserror::Error)]
pub enum PsymError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid portfolio file {file}: {reason}")]
    PortfolioFile { file: String, reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    RuleFile(#[from] RuleFileError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    DegenerateRange(#[from] DegenerateRangeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ParseError> for PsymError {
    fn from(err: ParseError) -> Self {
        PsymError::RuleFile(RuleFileError::Parse(err))
    }
}

impl From<AllocationError> for PsymError {
    fn from(err: AllocationError) -> Self {
        PsymError::RuleFile(RuleFileError::Allocation(err))
    }
}

impl From<&PsymError> for std::process::ExitCode {
    fn from(err: &PsymError) -> Self {
        let code: u8 = match err {
            PsymError::Io(_) => 1,
            PsymError::ConfigParse { .. }
            | PsymError::ConfigMissing { .. }
            | PsymError::ConfigInvalid { .. }
            | PsymError::PortfolioFile { .. } => 2,
            PsymError::Data { .. } => 3,
            PsymError::RuleFile(_) => 4,
            PsymError::Simulation(_) => 5,
            PsymError::DegenerateRange(_) => 6,
        };
        std::process::ExitCode::from(code)
    }
}
