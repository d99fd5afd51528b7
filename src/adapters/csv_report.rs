//! CSV report: one row per simulated day.

use std::io::Write;

use crate::domain::error::PsymError;
use crate::domain::simulation::SimulationResult;
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReport;

impl ReportPort for CsvReport {
    fn write(&self, result: &SimulationResult, out: &mut dyn Write) -> Result<(), PsymError> {
        let mut wtr = csv::Writer::from_writer(out);
        for snapshot in &result.snapshots {
            wtr.serialize(snapshot)
                .map_err(|e| PsymError::Io(std::io::Error::other(e)))?;
        }
        wtr.flush()?;
        Ok(())
    }
}
