use rand::RngCore;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::analysis::{DEFAULT_PERCENTILES, percentile_bands, probability_of_success};
use super::error::SimError;
use super::params::Params;
use super::returns::generate_returns;
use super::trajectory::{simulate_trajectory_into, trace_trajectory};
use super::types::{Matrix, ModelResult, ResultMatrix, ReturnMatrix};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Master seed; `None` draws a fresh one from OS entropy.
    pub seed: Option<u64>,
    /// Worker threads; 0 uses the host's available parallelism.
    pub threads: usize,
    pub percentiles: Vec<f64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seed: None,
            threads: 0,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

/// Full pipeline: validate, sample returns, simulate every trial, reduce.
pub fn run_model(params: &Params, options: &RunOptions) -> Result<ModelResult, SimError> {
    params.validate()?;

    let seed = options
        .seed
        .unwrap_or_else(|| rand::thread_rng().next_u64());
    let horizon = params.horizon();

    info!(
        num_sims = params.num_sims,
        years = horizon.years,
        working_years = horizon.working_years,
        seed,
        "starting simulations"
    );

    // One pool serves both sampling and trials and is dropped when the run ends.
    let pool = build_pool(options.threads)?;
    let returns = pool.install(|| generate_returns(params, seed))?;
    let results = run_trials_on(&pool, params, &returns)?;

    let success_probability = probability_of_success(&results);
    let bands = percentile_bands(&results, &options.percentiles);
    let first_trial_trace = trace_trajectory(params, returns.row(0))
        .map_err(|source| SimError::TrialFailed { trial: 0, source })?;

    info!(success_probability, "simulations completed");

    Ok(ModelResult {
        seed,
        horizon,
        results,
        success_probability,
        bands,
        first_trial_trace,
    })
}

/// Runs every trial against its own return row and collects the trajectories.
///
/// Row `i` of the result always belongs to return row `i`. The first trial that produces
/// a non-finite value aborts the whole run.
pub fn run_trials(
    params: &Params,
    returns: &ReturnMatrix,
    threads: usize,
) -> Result<ResultMatrix, SimError> {
    let pool = build_pool(threads)?;
    run_trials_on(&pool, params, returns)
}

fn build_pool(threads: usize) -> Result<ThreadPool, SimError> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("nestegg-trial-{i}"))
        .build()
        .map_err(|e| SimError::ThreadPool(e.to_string()))
}

fn run_trials_on(
    pool: &ThreadPool,
    params: &Params,
    returns: &ReturnMatrix,
) -> Result<ResultMatrix, SimError> {
    let trials = params.num_sims as usize;
    let years = params.horizon().years;
    if returns.num_rows() != trials || returns.num_cols() != years {
        return Err(SimError::ShapeMismatch {
            rows: returns.num_rows(),
            cols: returns.num_cols(),
            expected_rows: trials,
            expected_cols: years,
        });
    }

    let batch = trial_batch_size(trials, pool.current_num_threads());
    debug!(
        workers = pool.current_num_threads(),
        batch, "dispatching trials"
    );

    let mut data = vec![0.0; trials * years];
    pool.install(|| {
        data.par_chunks_mut(years)
            .zip(returns.as_slice().par_chunks(years))
            .enumerate()
            .with_min_len(batch)
            .try_for_each(|(trial, (portfolio, row))| {
                simulate_trajectory_into(params, row, portfolio)
                    .map_err(|source| SimError::TrialFailed { trial, source })
            })
    })
    .inspect_err(|e| warn!(error = %e, "simulation run aborted"))?;

    Ok(Matrix::from_flat(trials, years, data))
}

/// Contiguous trials handed to a worker at a time.
fn trial_batch_size(trials: usize, workers: usize) -> usize {
    trials.div_ceil(workers.max(1)).max(1)
}
