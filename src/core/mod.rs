mod cashflow;
mod engine;
mod error;
mod history;
mod returns;
mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cashflow::{TaxOutcome, project_year, settle_tax};
pub use engine::{CancellationToken, TrialRunner, run_simulation, run_simulation_with};
pub use error::SimulationError;
pub use history::{HistoricalReturn, HistoricalReturnsTable, ReturnBounds};
pub use returns::{MarketRates, ReturnModelGenerator};
pub use types::{
    DatedAmount, Downsize, Person, RentalIncome, ReturnModel, SimulationParameters,
    SimulationResult, SimulationSummary, Trial, TrialState, YearRecord, amount_in_year,
};
