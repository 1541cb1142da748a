use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use super::error::SimError;
use super::params::Params;
use super::types::{Matrix, ReturnMatrix};

/// Draws a `num_sims x years` matrix of i.i.d. normal annual returns.
///
/// Row `i` comes from its own generator seeded with `derive_seed(seed, i)`, so a trial's
/// returns depend only on the master seed and the trial index. Rows are filled on whichever
/// rayon pool the caller is installed in.
pub fn generate_returns(params: &Params, seed: u64) -> Result<ReturnMatrix, SimError> {
    let normal = Normal::new(params.return_rate, params.stdev)
        .map_err(|e| SimError::Distribution(format!("{e} (stdev = {})", params.stdev)))?;

    let rows = params.num_sims as usize;
    let cols = params.horizon().years;
    let mut data = vec![0.0; rows * cols];

    data.par_chunks_mut(cols.max(1))
        .enumerate()
        .for_each(|(trial, row)| {
            let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, trial as u64));
            for value in row.iter_mut() {
                *value = normal.sample(&mut rng);
            }
        });

    Ok(Matrix::from_flat(rows, cols, data))
}

pub fn derive_seed(master_seed: u64, trial: u64) -> u64 {
    splitmix64(master_seed ^ splitmix64(trial))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
