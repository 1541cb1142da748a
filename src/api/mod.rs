use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    DEFAULT_PERCENTILES, ModelResult, Params, PercentileBand, RunOptions, YearRecord, run_model,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    max_age: Option<u32>,
    starting_savings: Option<f64>,
    current_gross_income: Option<f64>,
    raise_pct: Option<f64>,
    tax_rate: Option<f64>,
    income_saved: Option<f64>,
    expense_ratio: Option<f64>,
    return_rate: Option<f64>,
    stdev: Option<f64>,
    ret_income: Option<f64>,
    inf_rate: Option<f64>,
    num_sims: Option<u32>,
    seed: Option<u64>,
    threads: Option<usize>,
}

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Monte Carlo retirement projection (accumulation + inflation-indexed drawdown)"
)]
struct Cli {
    #[arg(long, default_value_t = 25)]
    current_age: u32,
    #[arg(long, default_value_t = 67)]
    retirement_age: u32,
    #[arg(long, default_value_t = 95, help = "Last age simulated")]
    max_age: u32,
    #[arg(long, default_value_t = 25000.0)]
    starting_savings: f64,
    #[arg(long, default_value_t = 70000.0, help = "Gross salary this year")]
    current_gross_income: f64,
    #[arg(long, default_value_t = 3.0, help = "Annual pay rise in percent")]
    raise_pct: f64,
    #[arg(
        long,
        default_value_t = 20.0,
        help = "Tax rate on salary and on retirement withdrawals in percent"
    )]
    tax_rate: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Share of after-tax salary invested in percent"
    )]
    income_saved: f64,
    #[arg(long, default_value_t = 0.18, help = "Annual fund expense ratio in percent")]
    expense_ratio: f64,
    #[arg(long, default_value_t = 6.82, help = "Mean annual return in percent")]
    return_rate: f64,
    #[arg(
        long,
        default_value_t = 15.2,
        help = "Standard deviation of annual returns in percent"
    )]
    stdev: f64,
    #[arg(
        long,
        default_value_t = 30000.0,
        help = "Net retirement income wanted, in today's money"
    )]
    ret_income: f64,
    #[arg(long, default_value_t = 2.5, help = "Annual inflation in percent")]
    inf_rate: f64,
    #[arg(long, default_value_t = 1000)]
    num_sims: u32,
    #[arg(long, help = "Master seed; random when omitted")]
    seed: Option<u64>,
    #[arg(long, default_value_t = 0, help = "Worker threads, 0 uses every core")]
    threads: usize,
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_PERCENTILES,
        help = "Percentile bands to report"
    )]
    percentiles: Vec<f64>,
    #[arg(long, help = "Print the full JSON report instead of a summary")]
    json: bool,
}

#[derive(Debug)]
struct ApiRequest {
    params: Params,
    options: RunOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    seed: u64,
    num_sims: u32,
    years: usize,
    working_years: usize,
    ages: Vec<u32>,
    success_probability: f64,
    single_trajectory: Vec<f64>,
    percentile_bands: Vec<PercentileBand>,
    yearly_trace: Vec<YearRecord>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    for p in &cli.percentiles {
        if !(0.0..=100.0).contains(p) {
            return Err("--percentiles must be between 0 and 100".to_string());
        }
    }

    let max_threads = host_parallelism();
    if cli.threads > max_threads {
        return Err(format!("--threads must be between 0 and {max_threads}"));
    }

    let params = Params {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        max_age: cli.max_age,
        starting_savings: cli.starting_savings,
        current_gross_income: cli.current_gross_income,
        raise_pct: cli.raise_pct / 100.0,
        tax_rate: cli.tax_rate / 100.0,
        income_saved: cli.income_saved / 100.0,
        expense_ratio: cli.expense_ratio / 100.0,
        return_rate: cli.return_rate / 100.0,
        stdev: cli.stdev / 100.0,
        ret_income: cli.ret_income,
        inf_rate: cli.inf_rate / 100.0,
        num_sims: cli.num_sims,
    };
    params.validate().map_err(|e| e.to_string())?;

    Ok(ApiRequest {
        params,
        options: RunOptions {
            seed: cli.seed,
            threads: cli.threads,
            percentiles: cli.percentiles,
        },
    })
}

fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn simulate(request: &ApiRequest) -> Result<SimulateResponse, String> {
    let model = run_model(&request.params, &request.options).map_err(|e| e.to_string())?;
    Ok(build_simulate_response(&request.params, model))
}

fn build_simulate_response(params: &Params, model: ModelResult) -> SimulateResponse {
    SimulateResponse {
        seed: model.seed,
        num_sims: params.num_sims,
        years: model.horizon.years,
        working_years: model.horizon.working_years,
        ages: (0..model.horizon.years).map(|j| params.age_at(j)).collect(),
        success_probability: model.success_probability,
        single_trajectory: model.results.row(0).to_vec(),
        percentile_bands: model.bands,
        yearly_trace: model.first_trial_trace,
    }
}

fn format_summary(response: &SimulateResponse) -> String {
    let first_age = response.ages.first().copied().unwrap_or_default();
    let last_age = response.ages.last().copied().unwrap_or_default();
    let retirement_index = response.working_years;
    let final_index = response.years.saturating_sub(1);

    let mut out = format!(
        "Simulated {} trials over {} years (ages {}-{}), seed {}\n",
        response.num_sims, response.years, first_age, last_age, response.seed
    );
    out.push_str(&format!(
        "{:>12} {:>16} {:>16}\n",
        "percentile",
        format!("age {}", response.ages.get(retirement_index).copied().unwrap_or(last_age)),
        format!("age {last_age}")
    ));
    for band in &response.percentile_bands {
        let at_retirement = band.values.get(retirement_index).copied().unwrap_or(0.0);
        let at_end = band.values.get(final_index).copied().unwrap_or(0.0);
        out.push_str(&format!(
            "{:>12} {:>16.0} {:>16.0}\n",
            format!("p{}", band.percentile),
            at_retirement,
            at_end
        ));
    }
    out.push_str(&format!(
        "Your retirement account's probability of success is: {:.2}%\n",
        response.success_probability
    ));
    out
}

/// Parses command-line flags, runs the model and prints the report to stdout.
pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| e.exit());
    let json = cli.json;
    let request = build_request(cli)?;
    let response = simulate(&request)?;

    if json {
        let body = serde_json::to_string_pretty(&response)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{body}");
    } else {
        print!("{}", format_summary(&response));
    }
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "nestegg HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    // Trials run on their own rayon pool; keep them off the async workers.
    match tokio::task::spawn_blocking(move || simulate(&request)).await {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            error!(error = %e, "simulation task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.max_age {
        cli.max_age = v;
    }
    if let Some(v) = payload.starting_savings {
        cli.starting_savings = v;
    }
    if let Some(v) = payload.current_gross_income {
        cli.current_gross_income = v;
    }
    if let Some(v) = payload.raise_pct {
        cli.raise_pct = v;
    }
    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.income_saved {
        cli.income_saved = v;
    }
    if let Some(v) = payload.expense_ratio {
        cli.expense_ratio = v;
    }
    if let Some(v) = payload.return_rate {
        cli.return_rate = v;
    }
    if let Some(v) = payload.stdev {
        cli.stdev = v;
    }
    if let Some(v) = payload.ret_income {
        cli.ret_income = v;
    }
    if let Some(v) = payload.inf_rate {
        cli.inf_rate = v;
    }
    if let Some(v) = payload.num_sims {
        cli.num_sims = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = Some(v);
    }
    if let Some(v) = payload.threads {
        cli.threads = v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 25,
        retirement_age: 67,
        max_age: 95,
        starting_savings: 25_000.0,
        current_gross_income: 70_000.0,
        raise_pct: 3.0,
        tax_rate: 20.0,
        income_saved: 15.0,
        expense_ratio: 0.18,
        return_rate: 6.82,
        stdev: 15.2,
        ret_income: 30_000.0,
        inf_rate: 2.5,
        num_sims: 1_000,
        seed: None,
        threads: 0,
        percentiles: DEFAULT_PERCENTILES.to_vec(),
        json: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let parsed = Cli::try_parse_from(["nestegg"]).expect("defaults parse");
        let defaults = default_cli_for_api();
        let a = build_request(parsed).expect("valid defaults");
        let b = build_request(defaults).expect("valid defaults");
        assert_eq!(a.params, b.params);
        assert_eq!(a.options.percentiles, b.options.percentiles);
    }

    #[test]
    fn api_defaults_match_core_defaults() {
        let request = build_request(sample_cli()).expect("valid defaults");
        let core = Params::default();
        assert_eq!(request.params.current_age, core.current_age);
        assert_eq!(request.params.num_sims, core.num_sims);
        for (left, right) in [
            (request.params.raise_pct, core.raise_pct),
            (request.params.tax_rate, core.tax_rate),
            (request.params.income_saved, core.income_saved),
            (request.params.expense_ratio, core.expense_ratio),
            (request.params.return_rate, core.return_rate),
            (request.params.stdev, core.stdev),
            (request.params.inf_rate, core.inf_rate),
        ] {
            assert_approx(left, right);
        }
    }

    #[test]
    fn cli_parses_percent_flags_and_percentile_list() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "--tax-rate",
            "25",
            "--stdev",
            "0",
            "--seed",
            "9",
            "--percentiles",
            "10,50,90",
            "--json",
        ])
        .expect("flags parse");
        assert!(cli.json);
        let request = build_request(cli).expect("valid request");
        assert_approx(request.params.tax_rate, 0.25);
        assert_approx(request.params.stdev, 0.0);
        assert_eq!(request.options.seed, Some(9));
        assert_eq!(request.options.percentiles, vec![10.0, 50.0, 90.0]);
    }

    #[test]
    fn build_request_rejects_full_tax_rate() {
        let mut cli = sample_cli();
        cli.tax_rate = 100.0;
        let err = build_request(cli).expect_err("must reject 100% tax");
        assert!(err.contains("tax_rate"), "got {err}");
    }

    #[test]
    fn build_request_rejects_retirement_before_current_age() {
        let mut cli = sample_cli();
        cli.retirement_age = 20;
        let err = build_request(cli).expect_err("must reject age order");
        assert!(err.contains("retirement_age"), "got {err}");
    }

    #[test]
    fn build_request_rejects_out_of_range_percentiles() {
        let mut cli = sample_cli();
        cli.percentiles = vec![50.0, 101.0];
        let err = build_request(cli).expect_err("must reject percentile above 100");
        assert!(err.contains("--percentiles"));
    }

    #[test]
    fn build_request_rejects_more_threads_than_the_host_has() {
        let mut cli = sample_cli();
        cli.threads = usize::MAX;
        let err = build_request(cli).expect_err("must reject oversized pool");
        assert!(err.contains("--threads"), "got {err}");

        let mut cli = sample_cli();
        cli.threads = host_parallelism();
        build_request(cli).expect("host-sized pool is allowed");

        let err = api_request_from_json(r#"{"threads": 100000000}"#)
            .expect_err("must reject oversized pool");
        assert!(err.contains("--threads"), "got {err}");
    }

    #[test]
    fn build_request_rejects_unbounded_max_age() {
        let mut cli = sample_cli();
        cli.current_age = 0;
        cli.retirement_age = 1;
        cli.max_age = u32::MAX;
        let err = build_request(cli).expect_err("must reject endless horizon");
        assert!(err.contains("max_age"), "got {err}");
    }

    #[test]
    fn api_request_from_json_parses_camel_case_keys() {
        let json = r#"{
          "currentAge": 30,
          "retirementAge": 60,
          "maxAge": 90,
          "startingSavings": 50000,
          "currentGrossIncome": 80000,
          "raisePct": 2,
          "taxRate": 25,
          "incomeSaved": 10,
          "expenseRatio": 0.1,
          "returnRate": 6,
          "stdev": 12,
          "retIncome": 40000,
          "infRate": 3,
          "numSims": 250,
          "seed": 17,
          "threads": 1
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        let params = request.params;

        assert_eq!(params.current_age, 30);
        assert_eq!(params.retirement_age, 60);
        assert_eq!(params.max_age, 90);
        assert_approx(params.starting_savings, 50_000.0);
        assert_approx(params.current_gross_income, 80_000.0);
        assert_approx(params.raise_pct, 0.02);
        assert_approx(params.tax_rate, 0.25);
        assert_approx(params.income_saved, 0.10);
        assert_approx(params.expense_ratio, 0.001);
        assert_approx(params.return_rate, 0.06);
        assert_approx(params.stdev, 0.12);
        assert_approx(params.ret_income, 40_000.0);
        assert_approx(params.inf_rate, 0.03);
        assert_eq!(params.num_sims, 250);
        assert_eq!(request.options.seed, Some(17));
        assert_eq!(request.options.threads, 1);
    }

    #[test]
    fn api_request_from_json_falls_back_to_defaults() {
        let request = api_request_from_json("{}").expect("empty payload is valid");
        assert_eq!(request.params, build_request(sample_cli()).unwrap().params);
        assert_eq!(request.options.seed, None);
    }

    #[test]
    fn api_request_from_json_rejects_bad_types() {
        let err = api_request_from_json(r#"{"numSims": "many"}"#).unwrap_err();
        assert!(err.contains("Invalid API JSON payload"));
    }

    #[test]
    fn simulate_response_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.current_age = 60;
        cli.retirement_age = 62;
        cli.max_age = 65;
        cli.num_sims = 5;
        cli.seed = Some(3);

        let request = build_request(cli).expect("valid request");
        let response = simulate(&request).expect("simulation runs");
        assert_eq!(response.ages, vec![60, 61, 62, 63, 64, 65]);
        assert_eq!(response.single_trajectory.len(), 6);
        assert_eq!(response.yearly_trace.len(), 6);

        let json = serde_json::to_string(&response).expect("response should serialize");
        for key in [
            "\"seed\"",
            "\"workingYears\"",
            "\"successProbability\"",
            "\"singleTrajectory\"",
            "\"percentileBands\"",
            "\"yearlyTrace\"",
            "\"portfolioValue\"",
            "\"phase\":\"drawdown\"",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }

    #[test]
    fn summary_reports_success_probability_and_bands() {
        let mut cli = sample_cli();
        cli.num_sims = 20;
        cli.seed = Some(8);
        let request = build_request(cli).expect("valid request");
        let response = simulate(&request).expect("simulation runs");

        let summary = format_summary(&response);
        assert!(summary.contains("Simulated 20 trials over 71 years (ages 25-95), seed 8"));
        assert!(summary.contains("age 67"));
        assert!(summary.contains("p50"));
        assert!(summary.contains(&format!(
            "probability of success is: {:.2}%",
            response.success_probability
        )));
    }
}
