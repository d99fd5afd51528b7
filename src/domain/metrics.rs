//! Return calculation over a snapshot history.

use super::error::DegenerateRangeError;
use super::simulation::ValuationSnapshot;

const DAYS_PER_YEAR: f64 = 365.0;

/// Elapsed years between the first and last snapshot, by calendar date.
pub fn elapsed_years(snapshots: &[ValuationSnapshot]) -> f64 {
    match (snapshots.first(), snapshots.last()) {
        (Some(first), Some(last)) => (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR,
        _ => 0.0,
    }
}

/// Compound annual growth rate, in percent.
///
/// `initial_value` is the portfolio's worth before the first day's
/// directives run. An empty starting portfolio has no base to grow from, so
/// the cash contributed by the end of the run is used instead.
pub fn annualized_return(
    initial_value: f64,
    snapshots: &[ValuationSnapshot],
) -> Result<f64, DegenerateRangeError> {
    let (first, last) = match (snapshots.first(), snapshots.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(DegenerateRangeError {
                reason: "no snapshots recorded".to_string(),
            });
        }
    };

    let years = elapsed_years(snapshots);
    if years <= 0.0 {
        return Err(DegenerateRangeError {
            reason: format!("{} to {} spans no time", first.date, last.date),
        });
    }

    let start_value = if initial_value > 0.0 {
        initial_value
    } else {
        last.contributed
    };
    if start_value <= 0.0 {
        return Err(DegenerateRangeError {
            reason: format!("starting value ${:.2} is not positive", start_value),
        });
    }

    Ok(((last.total / start_value).powf(1.0 / years) - 1.0) * 100.0)
}
