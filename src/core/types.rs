use serde::Serialize;

use super::error::SimError;
use super::params::Horizon;

/// Dense row-major `rows x cols` matrix of `f64`.
///
/// Rows are trials and columns are simulated years, both for sampled returns and for
/// the resulting portfolio values.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Sampled annual returns, one row per trial.
pub type ReturnMatrix = Matrix;

/// Simulated portfolio values, one row per trial.
pub type ResultMatrix = Matrix;

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, SimError> {
        let row_count = rows.len();
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(row_count * cols);
        for row in rows {
            if row.len() != cols {
                return Err(SimError::ShapeMismatch {
                    rows: row_count,
                    cols: row.len(),
                    expected_rows: row_count,
                    expected_cols: cols,
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: row_count,
            cols,
            data,
        })
    }

    pub(crate) fn from_flat(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { rows, cols, data }
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // `chunks` panics on zero width.
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows().map(|row| row[index]).collect()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Accumulation,
    Drawdown,
}

/// Cashflow detail for one simulated year of one trial.
///
/// `withdrawal_net` and `tax` during drawdown are nominal; `tax` during accumulation is
/// income tax on that year's gross salary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year_index: usize,
    pub age: u32,
    pub phase: Phase,
    pub annual_return: f64,
    pub gross_income: f64,
    pub tax: f64,
    pub saved: f64,
    pub fund_expense: f64,
    pub withdrawal_net: f64,
    pub withdrawal_total: f64,
    pub portfolio_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileBand {
    pub percentile: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ModelResult {
    pub seed: u64,
    pub horizon: Horizon,
    pub results: ResultMatrix,
    pub success_probability: f64,
    pub bands: Vec<PercentileBand>,
    pub first_trial_trace: Vec<YearRecord>,
}
