//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report::CsvReport;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::portfolio_file::load_portfolio;
use crate::adapters::price_table::PriceTable;
use crate::adapters::text_report::TextReport;
use crate::domain::config_validation::{
    self, OutputMode, PortfolioSource, SimulationSettings, read_settings, validate_settings,
};
use crate::domain::directive::{Directive, referenced_tickers};
use crate::domain::error::{PsymError, RuleFileError};
use crate::domain::rule_parser;
use crate::domain::simulation::{SimulationResult, simulate};
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "psym", about = "Portfolio rule simulator")]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a rule file against historical quotes
    Simulate(SimulateArgs),
    /// Parse a rule file and print its directives
    Validate {
        #[arg(short, long)]
        rules: PathBuf,
    },
    /// Show the quote range of tickers in a data directory
    Info {
        #[arg(short, long)]
        data_dir: PathBuf,
        /// Tickers to describe; all CSV files when omitted
        #[arg(short, long)]
        ticker: Vec<String>,
    },
}

/// Options for `simulate`. Anything given here overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct SimulateArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(short, long)]
    pub rules: Option<PathBuf>,
    /// Portfolio JSON file, or `empty`
    #[arg(short, long)]
    pub portfolio: Option<String>,
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,
    #[arg(long)]
    pub from: Option<NaiveDate>,
    #[arg(long)]
    pub till: Option<NaiveDate>,
    #[arg(short, long)]
    pub output: Option<OutputMode>,
    #[arg(long)]
    pub out_file: Option<PathBuf>,
    #[arg(long)]
    pub auto_start: bool,
}

pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Simulate(args) => run_simulate(&args, cli.verbose > 0),
        Command::Validate { rules } => run_validate(&rules),
        Command::Info { data_dir, ticker } => run_info(&data_dir, &ticker),
    }
}

fn fail(err: &PsymError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

/// Merge the config file (if any) with command-line overrides and validate.
pub fn resolve_settings(args: &SimulateArgs) -> Result<SimulationSettings, PsymError> {
    let mut settings = match &args.config {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            read_settings(&FileConfigAdapter::from_file(path)?)?
        }
        None => SimulationSettings::default(),
    };

    if let Some(rules) = &args.rules {
        settings.rules = Some(rules.clone());
    }
    if let Some(portfolio) = &args.portfolio {
        settings.portfolio = PortfolioSource::from(portfolio.as_str());
    }
    if let Some(data_dir) = &args.data_dir {
        settings.data_dir = Some(data_dir.clone());
    }
    if let Some(from) = args.from {
        settings.start_date = Some(from);
    }
    if let Some(till) = args.till {
        settings.end_date = Some(till);
    }
    if let Some(output) = args.output {
        settings.output = output;
    }
    settings.auto_start |= args.auto_start;

    validate_settings(&settings)?;
    Ok(settings)
}

/// Read and parse a rule file, echoing the offending line on a syntax error.
pub fn load_rules(path: &Path) -> Result<Vec<Directive>, PsymError> {
    let source = fs::read_to_string(path)?;
    rule_parser::parse(&source).map_err(|e| {
        if let RuleFileError::Parse(parse_err) = &e {
            eprintln!("{}", path.display());
            eprintln!("{}", parse_err.display_with_context(&source));
        }
        PsymError::from(e)
    })
}

fn required<'s>(value: Option<&'s PathBuf>, key: &str) -> Result<&'s PathBuf, PsymError> {
    value.ok_or_else(|| PsymError::ConfigMissing {
        section: config_validation::SECTION.to_string(),
        key: key.to_string(),
    })
}

/// Resolve the simulated date range against the loaded quotes.
pub fn resolve_range(
    settings: &SimulationSettings,
    table: &PriceTable,
    tickers: &BTreeSet<String>,
) -> Result<(NaiveDate, NaiveDate), PsymError> {
    let names = || tickers.iter().map(String::as_str);

    let start = if settings.auto_start {
        let common = table.common_start(names()).ok_or_else(|| PsymError::Data {
            reason: "auto_start needs quotes for every referenced ticker".to_string(),
        })?;
        match settings.start_date {
            Some(configured) if configured > common => configured,
            _ => common,
        }
    } else {
        settings.start_date.ok_or_else(|| PsymError::ConfigMissing {
            section: config_validation::SECTION.to_string(),
            key: "start_date".to_string(),
        })?
    };

    let end = match settings.end_date {
        Some(end) => end,
        None => table.last_date(names()).ok_or_else(|| PsymError::Data {
            reason: "no end_date given and no quotes to infer it from".to_string(),
        })?,
    };

    if start >= end {
        return Err(PsymError::ConfigInvalid {
            section: config_validation::SECTION.to_string(),
            key: "start_date".to_string(),
            reason: format!("start {} is not before end {}", start, end),
        });
    }
    Ok((start, end))
}

/// Load every input named by `settings` and run the simulation.
pub fn run_simulation_pipeline(settings: &SimulationSettings) -> Result<SimulationResult, PsymError> {
    let rules_path = required(settings.rules.as_ref(), "rules")?;
    let data_dir = required(settings.data_dir.as_ref(), "data_dir")?;

    eprintln!("Loading rules from {}", rules_path.display());
    let directives = load_rules(rules_path)?;
    let portfolio = load_portfolio(&settings.portfolio)?;

    let mut tickers = referenced_tickers(&directives);
    tickers.extend(portfolio.holdings().keys().cloned());

    eprintln!(
        "Loading quotes for {} tickers from {}",
        tickers.len(),
        data_dir.display()
    );
    let table = CsvAdapter::new(data_dir.clone()).load(tickers.iter().map(String::as_str))?;

    let (start, end) = resolve_range(settings, &table, &tickers)?;
    eprintln!(
        "Simulating {} to {} ({} directives)",
        start,
        end,
        directives.len()
    );
    simulate(start, end, portfolio, &directives, &table)
}

pub fn write_report(
    result: &SimulationResult,
    output: OutputMode,
    show_journal: bool,
    out_file: Option<&Path>,
) -> Result<(), PsymError> {
    let report: Box<dyn ReportPort> = match output {
        OutputMode::Text => Box::new(TextReport::new(show_journal)),
        OutputMode::Csv => Box::new(CsvReport),
    };
    match out_file {
        Some(path) => {
            let mut file = fs::File::create(path)?;
            report.write(result, &mut file)?;
            file.flush()?;
            eprintln!("Report written to: {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            report.write(result, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn run_simulate(args: &SimulateArgs, verbose: bool) -> ExitCode {
    let settings = match resolve_settings(args) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let result = match run_simulation_pipeline(&settings) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    match write_report(&result, settings.output, verbose, args.out_file.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn run_validate(rules_path: &Path) -> ExitCode {
    eprintln!("Validating rules: {}", rules_path.display());
    let directives = match load_rules(rules_path) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    eprintln!("\nDirectives:");
    for directive in &directives {
        eprintln!("  {}", directive);
    }
    let tickers = referenced_tickers(&directives);
    if !tickers.is_empty() {
        eprintln!(
            "\nTickers: {}",
            tickers.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    eprintln!("\nRule file is valid.");
    ExitCode::SUCCESS
}

fn run_info(data_dir: &Path, tickers: &[String]) -> ExitCode {
    let adapter = CsvAdapter::new(data_dir.to_path_buf());
    let tickers = if tickers.is_empty() {
        match adapter.list_tickers() {
            Ok(t) => t,
            Err(e) => return fail(&e),
        }
    } else {
        tickers.iter().map(|t| t.to_uppercase()).collect()
    };

    if tickers.is_empty() {
        eprintln!("No quote files found in {}", data_dir.display());
        return ExitCode::SUCCESS;
    }

    let mut table = PriceTable::new();
    for ticker in &tickers {
        if let Err(e) = adapter.load_ticker(ticker, &mut table) {
            eprintln!("error reading {}: {}", ticker, e);
            continue;
        }
        match table.data_range(ticker) {
            Some(range) => println!(
                "{}: {} rows, {} to {}",
                ticker, range.rows, range.first, range.last
            ),
            None => eprintln!("{}: no data found", ticker),
        }
    }
    ExitCode::SUCCESS
}
