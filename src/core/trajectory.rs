use super::error::NonFiniteValue;
use super::params::Params;
use super::types::{Phase, YearRecord};

/// Year-by-year portfolio values of one trial.
///
/// `returns` must hold one entry per simulated year; entry 0 is ignored because the
/// first value is the starting balance.
pub fn simulate_trajectory(params: &Params, returns: &[f64]) -> Result<Vec<f64>, NonFiniteValue> {
    let mut portfolio = vec![0.0; params.horizon().years];
    simulate_trajectory_into(params, returns, &mut portfolio)?;
    Ok(portfolio)
}

/// Same recurrence as [`simulate_trajectory`], keeping every year's cashflows.
pub fn trace_trajectory(
    params: &Params,
    returns: &[f64],
) -> Result<Vec<YearRecord>, NonFiniteValue> {
    let years = params.horizon().years;
    let mut portfolio = vec![0.0; years];
    let mut trace = Vec::with_capacity(years);
    run_recurrence(params, returns, &mut portfolio, Some(&mut trace))?;
    Ok(trace)
}

pub(crate) fn simulate_trajectory_into(
    params: &Params,
    returns: &[f64],
    portfolio: &mut [f64],
) -> Result<(), NonFiniteValue> {
    run_recurrence(params, returns, portfolio, None)
}

fn run_recurrence(
    params: &Params,
    returns: &[f64],
    portfolio: &mut [f64],
    mut trace: Option<&mut Vec<YearRecord>>,
) -> Result<(), NonFiniteValue> {
    let horizon = params.horizon();
    debug_assert_eq!(returns.len(), horizon.years);
    debug_assert_eq!(portfolio.len(), horizon.years);

    let mut gross_income = params.current_gross_income;
    let mut saved = saved_from_gross(params, gross_income);
    portfolio[0] = params.starting_savings;
    let mut fund_expense = portfolio[0] * params.expense_ratio;

    if let Some(rows) = trace.as_deref_mut() {
        rows.push(YearRecord {
            year_index: 0,
            age: params.current_age,
            phase: Phase::Accumulation,
            annual_return: 0.0,
            gross_income,
            tax: gross_income * params.tax_rate,
            saved,
            fund_expense,
            withdrawal_net: 0.0,
            withdrawal_total: 0.0,
            portfolio_value: portfolio[0],
        });
    }

    for j in 1..horizon.working_years {
        gross_income = params.current_gross_income * (1.0 + params.raise_pct).powi(j as i32);
        let tax = gross_income * params.tax_rate;

        // Growth applies to last year's balance plus last year's savings net of fees.
        let value = (portfolio[j - 1] + saved - fund_expense) * (1.0 + returns[j]);
        ensure_finite(j, value)?;
        portfolio[j] = value;

        saved = saved_from_gross(params, gross_income);
        fund_expense = value * params.expense_ratio;

        if let Some(rows) = trace.as_deref_mut() {
            rows.push(YearRecord {
                year_index: j,
                age: params.age_at(j),
                phase: Phase::Accumulation,
                annual_return: returns[j],
                gross_income,
                tax,
                saved,
                fund_expense,
                withdrawal_net: 0.0,
                withdrawal_total: 0.0,
                portfolio_value: value,
            });
        }
    }

    for j in horizon.working_years..horizon.years {
        let net_income = params.ret_income * (1.0 + params.inf_rate).powi(j as i32);
        let tax = net_income * params.tax_rate / (1.0 - params.tax_rate);
        let reduction = net_income + tax;

        // Depleted portfolios keep compounding below zero.
        let value = (portfolio[j - 1] - fund_expense - reduction) * (1.0 + returns[j]);
        ensure_finite(j, value)?;
        portfolio[j] = value;

        fund_expense = value * params.expense_ratio;

        if let Some(rows) = trace.as_deref_mut() {
            rows.push(YearRecord {
                year_index: j,
                age: params.age_at(j),
                phase: Phase::Drawdown,
                annual_return: returns[j],
                gross_income: 0.0,
                tax,
                saved: 0.0,
                fund_expense,
                withdrawal_net: net_income,
                withdrawal_total: reduction,
                portfolio_value: value,
            });
        }
    }

    Ok(())
}

fn saved_from_gross(params: &Params, gross_income: f64) -> f64 {
    gross_income * (1.0 - params.tax_rate) * params.income_saved
}

fn ensure_finite(year: usize, value: f64) -> Result<(), NonFiniteValue> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NonFiniteValue { year, value })
    }
}
