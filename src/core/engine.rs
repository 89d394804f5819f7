use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::cashflow::project_year;
use super::error::SimulationError;
use super::history::HistoricalReturnsTable;
use super::returns::ReturnModelGenerator;
use super::types::{SimulationParameters, SimulationResult, Trial, TrialState};

/// Shared flag checked between trials; cancelling stops trials that have not started.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Independent generator for one trial: same seed, one ChaCha stream per trial.
fn trial_rng(seed: u64, trial_id: u32) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(trial_id as u64);
    rng
}

/// Runs single trials against a validated parameter set.
#[derive(Debug, Clone)]
pub struct TrialRunner<'a> {
    params: &'a SimulationParameters,
    returns: ReturnModelGenerator<'a>,
    inflation: Normal<f64>,
    horizon: u32,
}

impl<'a> TrialRunner<'a> {
    pub fn new(
        params: &'a SimulationParameters,
        table: &'a HistoricalReturnsTable,
    ) -> Result<Self, SimulationError> {
        params.validate(table.len())?;
        let returns = ReturnModelGenerator::new(params, table)?;
        let inflation = Normal::new(params.inflation_mean, params.inflation_std).map_err(|e| {
            SimulationError::Configuration(format!(
                "invalid inflation parameters (mean {}, std {}): {e}",
                params.inflation_mean, params.inflation_std
            ))
        })?;

        Ok(Self {
            params,
            returns,
            inflation,
            horizon: params.horizon_years(),
        })
    }

    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    /// Projects one full lifetime. Deterministic in `(params.seed, trial_id)`.
    pub fn run(&self, trial_id: u32) -> Result<Trial, SimulationError> {
        let mut rng = trial_rng(self.params.seed, trial_id);
        let rates = self.returns.generate(self.horizon as usize, &mut rng)?;

        let mut state = TrialState::initial(self.params);
        let mut records = Vec::with_capacity(rates.len());
        for (year, year_rates) in (0..self.horizon).zip(rates) {
            let inflation = self.inflation.sample(&mut rng);
            let (record, next) = project_year(&state, year, self.params, year_rates, inflation);
            records.push(record);
            state = next;
        }

        let solvent = records
            .last()
            .is_some_and(|record| record.ending_balance >= 0.0);
        Ok(Trial {
            id: trial_id,
            solvent,
            records,
        })
    }
}

/// Runs every configured trial against the built-in US market history.
pub fn run_simulation(params: &SimulationParameters) -> Result<SimulationResult, SimulationError> {
    let table = HistoricalReturnsTable::us_market();
    run_simulation_with(params, &table, &CancellationToken::new())
}

/// Runs `params.trials` independent trials in parallel and ranks them by terminal balance.
///
/// Trials are collected in id order before a stable sort, so equal terminal balances
/// keep id order and a fixed seed gives identical output on any thread count.
pub fn run_simulation_with(
    params: &SimulationParameters,
    table: &HistoricalReturnsTable,
    cancel: &CancellationToken,
) -> Result<SimulationResult, SimulationError> {
    let runner = TrialRunner::new(params, table)?;
    info!(
        trials = params.trials,
        horizon = runner.horizon(),
        model = %params.return_model,
        seed = params.seed,
        "starting simulation"
    );

    let outcome = (0..params.trials)
        .into_par_iter()
        .map(|trial_id| {
            if cancel.is_cancelled() {
                return Err(SimulationError::Cancelled);
            }
            let trial = runner.run(trial_id)?;
            debug!(
                trial = trial_id,
                solvent = trial.solvent,
                terminal = trial.terminal_balance(),
                "trial finished"
            );
            Ok(trial)
        })
        .collect::<Result<Vec<_>, _>>();

    let mut trials = match outcome {
        Ok(trials) => trials,
        Err(SimulationError::Cancelled) => {
            warn!("simulation cancelled before all trials ran");
            return Err(SimulationError::Cancelled);
        }
        Err(err) => return Err(err),
    };

    let success_count = trials.iter().filter(|trial| trial.solvent).count() as u32;
    let failure_count = trials.len() as u32 - success_count;
    trials.sort_by(|a, b| a.terminal_balance().total_cmp(&b.terminal_balance()));

    info!(
        success_count,
        failure_count,
        success_rate = success_count as f64 / params.trials as f64,
        "simulation finished"
    );

    Ok(SimulationResult {
        success_count,
        failure_count,
        trials,
    })
}
