use serde::Serialize;

use super::error::SimError;

/// Read-only inputs shared by every trial of a run.
///
/// Rates are fractions (`0.2` means 20%). Call [`Params::validate`] before simulating;
/// the engine assumes the invariants it checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    pub current_age: u32,
    pub retirement_age: u32,
    pub max_age: u32,
    pub starting_savings: f64,
    pub current_gross_income: f64,
    pub raise_pct: f64,
    pub tax_rate: f64,
    pub income_saved: f64,
    pub expense_ratio: f64,
    pub return_rate: f64,
    pub stdev: f64,
    pub ret_income: f64,
    pub inf_rate: f64,
    pub num_sims: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            current_age: 25,
            retirement_age: 67,
            max_age: 95,
            starting_savings: 25_000.0,
            current_gross_income: 70_000.0,
            raise_pct: 0.03,
            tax_rate: 0.2,
            income_saved: 0.15,
            expense_ratio: 0.0018,
            return_rate: 0.0682,
            stdev: 0.152,
            ret_income: 30_000.0,
            inf_rate: 0.025,
            num_sims: 1_000,
        }
    }
}

/// Oldest age a horizon may run to.
pub const MAX_SIMULATED_AGE: u32 = 150;

/// Number of simulated years and how many of them are spent working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Horizon {
    pub years: usize,
    pub working_years: usize,
}

impl Params {
    /// Saturates instead of wrapping when the ages are out of order; `years` is at least 1.
    pub fn horizon(&self) -> Horizon {
        let current = self.current_age as usize;
        Horizon {
            years: (self.max_age as usize).saturating_sub(current).saturating_add(1),
            working_years: (self.retirement_age as usize).saturating_sub(current),
        }
    }

    pub fn age_at(&self, year_index: usize) -> u32 {
        self.current_age + year_index as u32
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.retirement_age <= self.current_age {
            return Err(SimError::invalid(
                "retirement_age",
                "must be greater than current_age",
            ));
        }

        if self.max_age < self.retirement_age {
            return Err(SimError::invalid(
                "max_age",
                "must be greater than or equal to retirement_age",
            ));
        }

        if self.max_age > MAX_SIMULATED_AGE {
            return Err(SimError::invalid(
                "max_age",
                format!("must be at most {MAX_SIMULATED_AGE}"),
            ));
        }

        if self.num_sims == 0 {
            return Err(SimError::invalid("num_sims", "must be at least 1"));
        }

        for (field, amount) in [
            ("starting_savings", self.starting_savings),
            ("current_gross_income", self.current_gross_income),
            ("ret_income", self.ret_income),
        ] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(SimError::invalid(field, "must be a finite amount >= 0"));
            }
        }

        // A tax rate of 1 makes the drawdown gross-up divide by zero.
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(SimError::invalid(
                "tax_rate",
                "must be between 0 (inclusive) and 1 (exclusive)",
            ));
        }

        for (field, fraction) in [
            ("income_saved", self.income_saved),
            ("expense_ratio", self.expense_ratio),
        ] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(SimError::invalid(field, "must be between 0 and 1"));
            }
        }

        for (field, rate) in [
            ("raise_pct", self.raise_pct),
            ("return_rate", self.return_rate),
            ("inf_rate", self.inf_rate),
        ] {
            if !rate.is_finite() || rate <= -1.0 {
                return Err(SimError::invalid(field, "must be a finite rate > -1"));
            }
        }

        if !self.stdev.is_finite() || self.stdev < 0.0 {
            return Err(SimError::invalid("stdev", "must be a finite value >= 0"));
        }

        Ok(())
    }
}
