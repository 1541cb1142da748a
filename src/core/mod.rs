mod analysis;
mod engine;
mod error;
mod params;
mod returns;
mod trajectory;
mod types;

pub use analysis::{DEFAULT_PERCENTILES, percentile, percentile_bands, probability_of_success};
pub use engine::{RunOptions, run_model, run_trials};
pub use error::{NonFiniteValue, SimError};
pub use params::{Horizon, MAX_SIMULATED_AGE, Params};
pub use returns::{derive_seed, generate_returns};
pub use trajectory::{simulate_trajectory, trace_trajectory};
pub use types::{
    Matrix, ModelResult, PercentileBand, Phase, ResultMatrix, ReturnMatrix, YearRecord,
};
