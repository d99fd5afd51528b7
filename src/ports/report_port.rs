//! Report generation port trait.

use std::io::Write;

use crate::domain::error::PsymError;
use crate::domain::simulation::SimulationResult;

/// Port for rendering a finished simulation.
pub trait ReportPort {
    fn write(&self, result: &SimulationResult, out: &mut dyn Write) -> Result<(), PsymError>;
}
