use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Datelike;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    DatedAmount, Downsize, HistoricalReturnsTable, Person, RentalIncome, ReturnModel,
    SimulationParameters, SimulationResult, SimulationSummary, Trial, run_simulation,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    start_year: Option<i32>,
    current_age: Option<u32>,
    partner_current_age: Option<u32>,
    life_expectancy: Option<u32>,
    retirement_age: Option<u32>,
    partner_retirement_age: Option<u32>,

    initial_savings: Option<f64>,
    stock_percentage: Option<f64>,
    bond_percentage: Option<f64>,

    annual_earnings: Option<f64>,
    earnings_growth: Option<f64>,
    partner_earnings: Option<f64>,
    partner_earnings_growth: Option<f64>,
    annual_pension: Option<f64>,
    pension_growth: Option<f64>,
    partner_pension: Option<f64>,
    partner_pension_growth: Option<f64>,

    rental_start_year: Option<i32>,
    rental_end_year: Option<i32>,
    rental_amount: Option<f64>,
    rental_growth: Option<f64>,

    annual_expense: Option<f64>,
    mortgage_payment: Option<f64>,
    mortgage_years_remaining: Option<u32>,
    tax_rate: Option<f64>,
    inflation_mean: Option<f64>,
    inflation_std: Option<f64>,
    expense_decline: Option<f64>,

    social_security: Option<f64>,
    social_security_start_age: Option<u32>,
    partner_social_security: Option<f64>,
    partner_social_security_start_age: Option<u32>,
    cola_rate: Option<f64>,
    healthcare_cost: Option<f64>,
    healthcare_start_age: Option<u32>,
    partner_healthcare_cost: Option<f64>,
    partner_healthcare_start_age: Option<u32>,

    stock_return_mean: Option<f64>,
    stock_return_std: Option<f64>,
    bond_return_mean: Option<f64>,
    bond_return_std: Option<f64>,

    downsize_after_years: Option<u32>,
    downsize_proceeds: Option<f64>,
    expense_adjustments: Option<Vec<DatedAmount>>,
    one_time_expenses: Option<Vec<DatedAmount>>,
    windfalls: Option<Vec<DatedAmount>>,

    model: Option<String>,
    trials: Option<u32>,
    seed: Option<u64>,
    include_trials: Option<bool>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nestegg",
    about = "Monte Carlo household retirement projection (two earners, flat tax, stochastic returns and inflation)"
)]
struct Cli {
    #[arg(
        long,
        help = "Load the full parameter set from a JSON file; --trials and --seed still override"
    )]
    params: Option<PathBuf>,
    #[arg(long, help = "Calendar year of the first projected year; defaults to this year")]
    start_year: Option<i32>,
    #[arg(long, default_value_t = 55)]
    current_age: u32,
    #[arg(long, default_value_t = 50)]
    partner_current_age: u32,
    #[arg(long, default_value_t = 92)]
    life_expectancy: u32,
    #[arg(long, default_value_t = 60)]
    retirement_age: u32,
    #[arg(long, default_value_t = 58)]
    partner_retirement_age: u32,
    #[arg(long, default_value_t = 2_000_000.0)]
    initial_savings: f64,
    #[arg(long, default_value_t = 60.0, help = "Share of the portfolio in stocks, percent")]
    stock_percentage: f64,
    #[arg(long, help = "Share of the portfolio in bonds, percent; defaults to 100 - stocks")]
    bond_percentage: Option<f64>,
    #[arg(long, default_value_t = 200_000.0)]
    annual_earnings: f64,
    #[arg(long, default_value_t = 5.0, help = "Yearly earnings raise in percent")]
    earnings_growth: f64,
    #[arg(long, default_value_t = 200_000.0)]
    partner_earnings: f64,
    #[arg(long, default_value_t = 5.0, help = "Partner's yearly earnings raise in percent")]
    partner_earnings_growth: f64,
    #[arg(long, default_value_t = 0.0)]
    annual_pension: f64,
    #[arg(long, default_value_t = 0.0, help = "Yearly pension increase in percent")]
    pension_growth: f64,
    #[arg(long, default_value_t = 0.0)]
    partner_pension: f64,
    #[arg(long, default_value_t = 0.0, help = "Partner's yearly pension increase in percent")]
    partner_pension_growth: f64,
    #[arg(long, help = "First calendar year of rental income")]
    rental_start_year: Option<i32>,
    #[arg(long, help = "Last calendar year of rental income")]
    rental_end_year: Option<i32>,
    #[arg(long, default_value_t = 0.0)]
    rental_amount: f64,
    #[arg(long, default_value_t = 0.0, help = "Yearly rental increase in percent")]
    rental_growth: f64,
    #[arg(long, default_value_t = 120_000.0)]
    annual_expense: f64,
    #[arg(long, default_value_t = 36_000.0, help = "Yearly mortgage payment")]
    mortgage_payment: f64,
    #[arg(long, default_value_t = 25)]
    mortgage_years_remaining: u32,
    #[arg(long, default_value_t = 10.0, help = "Flat tax rate in percent")]
    tax_rate: f64,
    #[arg(long, default_value_t = 2.5, help = "Expected annual inflation in percent")]
    inflation_mean: f64,
    #[arg(long, default_value_t = 1.0, help = "Inflation volatility in percent")]
    inflation_std: f64,
    #[arg(
        long,
        default_value_t = 0.5,
        help = "Yearly expense decline once both people are retired, percent"
    )]
    expense_decline: f64,
    #[arg(long, default_value_t = 36_000.0, help = "Annual social security benefit")]
    social_security: f64,
    #[arg(long, default_value_t = 67)]
    social_security_start_age: u32,
    #[arg(long, default_value_t = 18_000.0)]
    partner_social_security: f64,
    #[arg(long, default_value_t = 65)]
    partner_social_security_start_age: u32,
    #[arg(long, default_value_t = 1.5, help = "Social security COLA in percent")]
    cola_rate: f64,
    #[arg(long, default_value_t = 5_000.0, help = "Annual bridge healthcare cost")]
    healthcare_cost: f64,
    #[arg(long, help = "Bridge healthcare start age; defaults to retirement age")]
    healthcare_start_age: Option<u32>,
    #[arg(long, default_value_t = 5_000.0)]
    partner_healthcare_cost: f64,
    #[arg(long, help = "Partner bridge healthcare start age; defaults to partner retirement age")]
    partner_healthcare_start_age: Option<u32>,
    #[arg(long, default_value_t = 10.0, help = "Expected annual stock return in percent")]
    stock_return_mean: f64,
    #[arg(long, default_value_t = 19.0, help = "Stock return volatility in percent")]
    stock_return_std: f64,
    #[arg(long, default_value_t = 3.75, help = "Expected annual bond return in percent")]
    bond_return_mean: f64,
    #[arg(long, default_value_t = 1.2, help = "Bond return volatility in percent")]
    bond_return_std: f64,
    #[arg(long, default_value_t = 0, help = "Projection year in which the home is sold")]
    downsize_after_years: u32,
    #[arg(long, default_value_t = 0.0, help = "Net proceeds added to savings on downsizing")]
    downsize_proceeds: f64,
    #[arg(
        long = "expense-adjustment",
        value_parser = parse_dated_amount,
        help = "Recurring expense change as YEAR:AMOUNT; repeatable"
    )]
    expense_adjustments: Vec<DatedAmount>,
    #[arg(
        long = "one-time-expense",
        value_parser = parse_dated_amount,
        help = "One-off expense as YEAR:AMOUNT; repeatable"
    )]
    one_time_expenses: Vec<DatedAmount>,
    #[arg(
        long = "windfall",
        value_parser = parse_dated_amount,
        help = "Lump-sum inflow as YEAR:AMOUNT; repeatable"
    )]
    windfalls: Vec<DatedAmount>,
    #[arg(
        long,
        default_value = "normal",
        help = "Return model: empirical, historical, normal, lognormal or student-t"
    )]
    model: String,
    #[arg(long, help = "Number of trials [default: 1000]")]
    trials: Option<u32>,
    #[arg(long, help = "Top-level random seed [default: 42]")]
    seed: Option<u64>,
    #[arg(long, help = "Print every sorted trial instead of the three representative ones")]
    full: bool,
}

const DEFAULT_TRIALS: u32 = 1_000;
const DEFAULT_SEED: u64 = 42;

#[derive(Debug)]
struct ApiRequest {
    params: SimulationParameters,
    include_trials: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse<'a> {
    model: ReturnModel,
    seed: u64,
    start_year: i32,
    horizon_years: u32,
    summary: SimulationSummary,
    worst_case: Option<&'a Trial>,
    median_case: Option<&'a Trial>,
    best_case: Option<&'a Trial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trials: Option<&'a [Trial]>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn parse_dated_amount(raw: &str) -> Result<DatedAmount, String> {
    let (year, amount) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected YEAR:AMOUNT, got '{raw}'"))?;
    let year = year
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid year in '{raw}': {e}"))?;
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid amount in '{raw}': {e}"))?;
    if !amount.is_finite() {
        return Err(format!("amount in '{raw}' must be finite"));
    }
    Ok(DatedAmount::new(year, amount))
}

fn current_calendar_year() -> i32 {
    chrono::Local::now().year()
}

fn load_parameters(path: &Path) -> Result<SimulationParameters, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid parameter file {}: {e}", path.display()))
}

fn check_percent(name: &str, value: f64) -> Result<(), String> {
    if !(0.0..=100.0).contains(&value) {
        return Err(format!("{name} must be between 0 and 100"));
    }
    Ok(())
}

fn check_rate(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= -100.0 {
        return Err(format!("{name} must be > -100"));
    }
    Ok(())
}

fn check_amount(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{name} must be >= 0"));
    }
    Ok(())
}

fn build_parameters(cli: Cli) -> Result<SimulationParameters, String> {
    let mut params = match &cli.params {
        Some(path) => load_parameters(path)?,
        None => parameters_from_flags(&cli)?,
    };
    if let Some(trials) = cli.trials {
        params.trials = trials;
    }
    if let Some(seed) = cli.seed {
        params.seed = seed;
    }

    params
        .validate(HistoricalReturnsTable::us_market().len())
        .map_err(|e| e.to_string())?;
    Ok(params)
}

fn parameters_from_flags(cli: &Cli) -> Result<SimulationParameters, String> {
    if cli.life_expectancy < cli.current_age {
        return Err("--life-expectancy must be >= --current-age".to_string());
    }

    check_percent("--stock-percentage", cli.stock_percentage)?;
    let bond_percentage = cli.bond_percentage.unwrap_or(100.0 - cli.stock_percentage);
    check_percent("--bond-percentage", bond_percentage)?;
    if (cli.stock_percentage + bond_percentage - 100.0).abs() > 1e-9 {
        return Err("--stock-percentage and --bond-percentage must sum to 100".to_string());
    }

    if !(0.0..100.0).contains(&cli.tax_rate) {
        return Err("--tax-rate must be >= 0 and < 100".to_string());
    }

    for (name, value) in [
        ("--earnings-growth", cli.earnings_growth),
        ("--partner-earnings-growth", cli.partner_earnings_growth),
        ("--pension-growth", cli.pension_growth),
        ("--partner-pension-growth", cli.partner_pension_growth),
        ("--rental-growth", cli.rental_growth),
        ("--inflation-mean", cli.inflation_mean),
        ("--cola-rate", cli.cola_rate),
        ("--stock-return-mean", cli.stock_return_mean),
        ("--bond-return-mean", cli.bond_return_mean),
    ] {
        check_rate(name, value)?;
    }

    for (name, value) in [
        ("--initial-savings", cli.initial_savings),
        ("--annual-earnings", cli.annual_earnings),
        ("--partner-earnings", cli.partner_earnings),
        ("--annual-pension", cli.annual_pension),
        ("--partner-pension", cli.partner_pension),
        ("--rental-amount", cli.rental_amount),
        ("--annual-expense", cli.annual_expense),
        ("--mortgage-payment", cli.mortgage_payment),
        ("--social-security", cli.social_security),
        ("--partner-social-security", cli.partner_social_security),
        ("--healthcare-cost", cli.healthcare_cost),
        ("--partner-healthcare-cost", cli.partner_healthcare_cost),
        ("--downsize-proceeds", cli.downsize_proceeds),
        ("--inflation-std", cli.inflation_std),
        ("--stock-return-std", cli.stock_return_std),
        ("--bond-return-std", cli.bond_return_std),
    ] {
        check_amount(name, value)?;
    }

    let rental = match (cli.rental_start_year, cli.rental_end_year) {
        (Some(start), Some(end)) if end < start => {
            return Err("--rental-end-year must be >= --rental-start-year".to_string());
        }
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, i32::MAX),
        (None, Some(_)) => {
            return Err("--rental-end-year requires --rental-start-year".to_string());
        }
        // No window: rental income never applies.
        (None, None) => (i32::MAX, i32::MIN),
    };

    let return_model = cli.model.parse::<ReturnModel>().map_err(|e| e.to_string())?;

    Ok(SimulationParameters {
        start_year: cli.start_year.unwrap_or_else(current_calendar_year),
        life_expectancy: cli.life_expectancy,
        primary: Person {
            current_age: cli.current_age,
            retirement_age: cli.retirement_age,
            annual_earnings: cli.annual_earnings,
            earnings_growth: cli.earnings_growth / 100.0,
            annual_pension: cli.annual_pension,
            pension_growth: cli.pension_growth / 100.0,
            social_security: cli.social_security,
            social_security_start_age: cli.social_security_start_age,
            healthcare_cost: cli.healthcare_cost,
            healthcare_start_age: cli.healthcare_start_age.unwrap_or(cli.retirement_age),
        },
        partner: Person {
            current_age: cli.partner_current_age,
            retirement_age: cli.partner_retirement_age,
            annual_earnings: cli.partner_earnings,
            earnings_growth: cli.partner_earnings_growth / 100.0,
            annual_pension: cli.partner_pension,
            pension_growth: cli.partner_pension_growth / 100.0,
            social_security: cli.partner_social_security,
            social_security_start_age: cli.partner_social_security_start_age,
            healthcare_cost: cli.partner_healthcare_cost,
            healthcare_start_age: cli
                .partner_healthcare_start_age
                .unwrap_or(cli.partner_retirement_age),
        },
        initial_savings: cli.initial_savings,
        stock_percentage: cli.stock_percentage,
        bond_percentage,
        stock_return_mean: cli.stock_return_mean / 100.0,
        stock_return_std: cli.stock_return_std / 100.0,
        bond_return_mean: cli.bond_return_mean / 100.0,
        bond_return_std: cli.bond_return_std / 100.0,
        rental: RentalIncome {
            start_year: rental.0,
            end_year: rental.1,
            annual_amount: cli.rental_amount,
            yearly_increase: cli.rental_growth / 100.0,
        },
        annual_expense: cli.annual_expense,
        mortgage_payment: cli.mortgage_payment,
        mortgage_years_remaining: cli.mortgage_years_remaining,
        tax_rate: cli.tax_rate / 100.0,
        inflation_mean: cli.inflation_mean / 100.0,
        inflation_std: cli.inflation_std / 100.0,
        expense_decline: cli.expense_decline / 100.0,
        cola_rate: cli.cola_rate / 100.0,
        downsize: Downsize {
            year_offset: cli.downsize_after_years,
            proceeds: cli.downsize_proceeds,
        },
        expense_adjustments: cli.expense_adjustments.clone(),
        one_time_expenses: cli.one_time_expenses.clone(),
        windfalls: cli.windfalls.clone(),
        return_model,
        trials: cli.trials.unwrap_or(DEFAULT_TRIALS),
        seed: cli.seed.unwrap_or(DEFAULT_SEED),
    })
}

fn build_simulate_response<'a>(
    params: &SimulationParameters,
    result: &'a SimulationResult,
    include_trials: bool,
) -> SimulateResponse<'a> {
    SimulateResponse {
        model: params.return_model,
        seed: params.seed,
        start_year: params.start_year,
        horizon_years: params.horizon_years(),
        summary: result.summary(),
        worst_case: result.percentile_trial(10.0),
        median_case: result.percentile_trial(50.0),
        best_case: result.percentile_trial(90.0),
        trials: include_trials.then_some(result.trials.as_slice()),
    }
}

/// Parses CLI arguments (first item is the program name), runs the projection and
/// renders the JSON report.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let full = cli.full;
    let params = build_parameters(cli)?;
    let result = run_simulation(&params).map_err(|e| e.to_string())?;
    let response = build_simulate_response(&params, &result, full);
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to render report: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement projection API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
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

    let ApiRequest {
        params,
        include_trials,
    } = request;
    let outcome = tokio::task::spawn_blocking(move || {
        let result = run_simulation(&params);
        (params, result)
    })
    .await;

    match outcome {
        Ok((params, Ok(result))) => json_response(
            StatusCode::OK,
            build_simulate_response(&params, &result, include_trials),
        ),
        Ok((_, Err(e))) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            error!(error = %e, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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

    if let Some(v) = payload.start_year {
        cli.start_year = Some(v);
    }
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.partner_current_age {
        cli.partner_current_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.partner_retirement_age {
        cli.partner_retirement_age = v;
    }

    if let Some(v) = payload.initial_savings {
        cli.initial_savings = v;
    }
    if let Some(v) = payload.stock_percentage {
        cli.stock_percentage = v;
    }
    if let Some(v) = payload.bond_percentage {
        cli.bond_percentage = Some(v);
    }

    if let Some(v) = payload.annual_earnings {
        cli.annual_earnings = v;
    }
    if let Some(v) = payload.earnings_growth {
        cli.earnings_growth = v;
    }
    if let Some(v) = payload.partner_earnings {
        cli.partner_earnings = v;
    }
    if let Some(v) = payload.partner_earnings_growth {
        cli.partner_earnings_growth = v;
    }
    if let Some(v) = payload.annual_pension {
        cli.annual_pension = v;
    }
    if let Some(v) = payload.pension_growth {
        cli.pension_growth = v;
    }
    if let Some(v) = payload.partner_pension {
        cli.partner_pension = v;
    }
    if let Some(v) = payload.partner_pension_growth {
        cli.partner_pension_growth = v;
    }

    if let Some(v) = payload.rental_start_year {
        cli.rental_start_year = Some(v);
    }
    if let Some(v) = payload.rental_end_year {
        cli.rental_end_year = Some(v);
    }
    if let Some(v) = payload.rental_amount {
        cli.rental_amount = v;
    }
    if let Some(v) = payload.rental_growth {
        cli.rental_growth = v;
    }

    if let Some(v) = payload.annual_expense {
        cli.annual_expense = v;
    }
    if let Some(v) = payload.mortgage_payment {
        cli.mortgage_payment = v;
    }
    if let Some(v) = payload.mortgage_years_remaining {
        cli.mortgage_years_remaining = v;
    }
    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.inflation_mean {
        cli.inflation_mean = v;
    }
    if let Some(v) = payload.inflation_std {
        cli.inflation_std = v;
    }
    if let Some(v) = payload.expense_decline {
        cli.expense_decline = v;
    }

    if let Some(v) = payload.social_security {
        cli.social_security = v;
    }
    if let Some(v) = payload.social_security_start_age {
        cli.social_security_start_age = v;
    }
    if let Some(v) = payload.partner_social_security {
        cli.partner_social_security = v;
    }
    if let Some(v) = payload.partner_social_security_start_age {
        cli.partner_social_security_start_age = v;
    }
    if let Some(v) = payload.cola_rate {
        cli.cola_rate = v;
    }
    if let Some(v) = payload.healthcare_cost {
        cli.healthcare_cost = v;
    }
    if let Some(v) = payload.healthcare_start_age {
        cli.healthcare_start_age = Some(v);
    }
    if let Some(v) = payload.partner_healthcare_cost {
        cli.partner_healthcare_cost = v;
    }
    if let Some(v) = payload.partner_healthcare_start_age {
        cli.partner_healthcare_start_age = Some(v);
    }

    if let Some(v) = payload.stock_return_mean {
        cli.stock_return_mean = v;
    }
    if let Some(v) = payload.stock_return_std {
        cli.stock_return_std = v;
    }
    if let Some(v) = payload.bond_return_mean {
        cli.bond_return_mean = v;
    }
    if let Some(v) = payload.bond_return_std {
        cli.bond_return_std = v;
    }

    if let Some(v) = payload.downsize_after_years {
        cli.downsize_after_years = v;
    }
    if let Some(v) = payload.downsize_proceeds {
        cli.downsize_proceeds = v;
    }
    if let Some(v) = payload.expense_adjustments {
        cli.expense_adjustments = v;
    }
    if let Some(v) = payload.one_time_expenses {
        cli.one_time_expenses = v;
    }
    if let Some(v) = payload.windfalls {
        cli.windfalls = v;
    }

    if let Some(v) = payload.model {
        cli.model = v;
    }
    if let Some(v) = payload.trials {
        cli.trials = Some(v);
    }
    if let Some(v) = payload.seed {
        cli.seed = Some(v);
    }

    let params = build_parameters(cli)?;
    Ok(ApiRequest {
        params,
        include_trials: payload.include_trials.unwrap_or(false),
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        params: None,
        start_year: None,
        current_age: 55,
        partner_current_age: 50,
        life_expectancy: 92,
        retirement_age: 60,
        partner_retirement_age: 58,
        initial_savings: 2_000_000.0,
        stock_percentage: 60.0,
        bond_percentage: None,
        annual_earnings: 200_000.0,
        earnings_growth: 5.0,
        partner_earnings: 200_000.0,
        partner_earnings_growth: 5.0,
        annual_pension: 0.0,
        pension_growth: 0.0,
        partner_pension: 0.0,
        partner_pension_growth: 0.0,
        rental_start_year: None,
        rental_end_year: None,
        rental_amount: 0.0,
        rental_growth: 0.0,
        annual_expense: 120_000.0,
        mortgage_payment: 36_000.0,
        mortgage_years_remaining: 25,
        tax_rate: 10.0,
        inflation_mean: 2.5,
        inflation_std: 1.0,
        expense_decline: 0.5,
        social_security: 36_000.0,
        social_security_start_age: 67,
        partner_social_security: 18_000.0,
        partner_social_security_start_age: 65,
        cola_rate: 1.5,
        healthcare_cost: 5_000.0,
        healthcare_start_age: None,
        partner_healthcare_cost: 5_000.0,
        partner_healthcare_start_age: None,
        stock_return_mean: 10.0,
        stock_return_std: 19.0,
        bond_return_mean: 3.75,
        bond_return_std: 1.2,
        downsize_after_years: 0,
        downsize_proceeds: 0.0,
        expense_adjustments: Vec::new(),
        one_time_expenses: Vec::new(),
        windfalls: Vec::new(),
        model: "normal".to_string(),
        trials: None,
        seed: None,
        full: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SimulationError;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        let mut cli = default_cli_for_api();
        cli.start_year = Some(2025);
        cli.trials = Some(50);
        cli
    }

    #[test]
    fn clap_defaults_match_api_defaults() {
        let parsed = Cli::try_parse_from(["nestegg", "--start-year", "2025", "--trials", "50"])
            .expect("defaults parse");
        let from_flags = build_parameters(parsed).expect("valid");
        let from_api = build_parameters(sample_cli()).expect("valid");
        assert_eq!(from_flags, from_api);
    }

    #[test]
    fn build_parameters_converts_percentages_to_decimals() {
        let params = build_parameters(sample_cli()).expect("valid parameters");
        assert_approx(params.tax_rate, 0.10);
        assert_approx(params.inflation_mean, 0.025);
        assert_approx(params.stock_return_std, 0.19);
        assert_approx(params.primary.earnings_growth, 0.05);
        assert_approx(params.bond_percentage, 40.0);
        assert_eq!(params.primary.healthcare_start_age, 60);
        assert_eq!(params.partner.healthcare_start_age, 58);
        assert_eq!(params.seed, DEFAULT_SEED);
        assert_eq!(params.trials, 50);
        assert_eq!(params.start_year, 2025);
    }

    #[test]
    fn build_parameters_rejects_allocation_not_summing_to_100() {
        let mut cli = sample_cli();
        cli.bond_percentage = Some(30.0);
        let err = build_parameters(cli).expect_err("must reject allocation");
        assert!(err.contains("--bond-percentage"));
    }

    #[test]
    fn build_parameters_rejects_life_expectancy_below_age() {
        let mut cli = sample_cli();
        cli.life_expectancy = 50;
        let err = build_parameters(cli).expect_err("must reject horizon");
        assert!(err.contains("--life-expectancy"));
    }

    #[test]
    fn build_parameters_rejects_unknown_model_as_configuration_error() {
        let mut cli = sample_cli();
        cli.model = "pareto".to_string();
        let err = build_parameters(cli).expect_err("must reject model");
        assert_eq!(
            err,
            SimulationError::Configuration("unsupported return model 'pareto'".to_string())
                .to_string()
        );
    }

    #[test]
    fn build_parameters_rejects_zero_trials() {
        let mut cli = sample_cli();
        cli.trials = Some(0);
        let err = build_parameters(cli).expect_err("must reject zero trials");
        assert!(err.contains("trial count"));
    }

    #[test]
    fn build_parameters_rejects_inverted_rental_window() {
        let mut cli = sample_cli();
        cli.rental_start_year = Some(2030);
        cli.rental_end_year = Some(2029);
        let err = build_parameters(cli).expect_err("must reject rental window");
        assert!(err.contains("--rental-end-year"));
    }

    #[test]
    fn no_rental_window_means_no_rental_income() {
        let params = build_parameters(sample_cli()).expect("valid parameters");
        assert!(params.rental.start_year > params.rental.end_year);
    }

    #[test]
    fn parse_dated_amount_reads_year_and_amount() {
        assert_eq!(
            parse_dated_amount("2031:-12000.5"),
            Ok(DatedAmount::new(2031, -12_000.5))
        );
        assert!(parse_dated_amount("2031").is_err());
        assert!(parse_dated_amount("year:100").is_err());
        assert!(parse_dated_amount("2031:lots").is_err());
    }

    #[test]
    fn repeated_flags_accumulate_dated_amounts() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "--windfall",
            "2030:1000",
            "--windfall",
            "2030:500",
            "--one-time-expense",
            "2028:40000",
        ])
        .expect("flags parse");
        assert_eq!(cli.windfalls.len(), 2);
        assert_eq!(cli.one_time_expenses, vec![DatedAmount::new(2028, 40_000.0)]);
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
          "startYear": 2026,
          "currentAge": 62,
          "partnerCurrentAge": 60,
          "lifeExpectancy": 95,
          "retirementAge": 65,
          "initialSavings": 1500000,
          "stockPercentage": 70,
          "taxRate": 15,
          "model": "Students-T Distribution",
          "trials": 321,
          "seed": 9,
          "windfalls": [{ "year": 2030, "amount": 25000 }],
          "includeTrials": true
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        let params = request.params;

        assert!(request.include_trials);
        assert_eq!(params.start_year, 2026);
        assert_eq!(params.primary.current_age, 62);
        assert_eq!(params.partner.current_age, 60);
        assert_eq!(params.life_expectancy, 95);
        assert_eq!(params.primary.retirement_age, 65);
        assert_approx(params.initial_savings, 1_500_000.0);
        assert_approx(params.stock_percentage, 70.0);
        assert_approx(params.bond_percentage, 30.0);
        assert_approx(params.tax_rate, 0.15);
        assert_eq!(params.return_model, ReturnModel::StudentT);
        assert_eq!(params.trials, 321);
        assert_eq!(params.seed, 9);
        assert_eq!(params.windfalls, vec![DatedAmount::new(2030, 25_000.0)]);
    }

    #[test]
    fn api_request_rejects_unsupported_model() {
        let err = api_request_from_json(r#"{ "model": "uniform" }"#).expect_err("bad model");
        assert!(err.contains("unsupported return model"));
    }

    #[test]
    fn api_request_rejects_out_of_range_ages_and_years() {
        let err = api_request_from_json(r#"{ "lifeExpectancy": 4294967295 }"#)
            .expect_err("life expectancy out of range");
        assert!(err.contains("life expectancy must be <="));

        let err = api_request_from_json(r#"{ "partnerCurrentAge": 4294967293 }"#)
            .expect_err("partner age out of range");
        assert!(err.contains("partner current age"));

        let err = api_request_from_json(r#"{ "startYear": 2147483640 }"#)
            .expect_err("start year out of range");
        assert!(err.contains("start year"));

        let err = api_request_from_json(r#"{ "trials": 4000000000 }"#)
            .expect_err("too many trials");
        assert!(err.contains("trial count"));
    }

    #[test]
    fn parameter_file_round_trips_through_json() {
        let params = build_parameters(sample_cli()).expect("valid parameters");
        let path = std::env::temp_dir().join(format!("nestegg-params-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&params).expect("serialize"))
            .expect("write params file");

        let mut cli = sample_cli();
        cli.params = Some(path.clone());
        cli.seed = Some(99);
        let loaded = build_parameters(cli).expect("file loads");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.seed, 99);
        assert_eq!(loaded.trials, params.trials);
        assert_eq!(loaded.primary.current_age, params.primary.current_age);
        assert_eq!(loaded.partner.retirement_age, params.partner.retirement_age);
        assert_eq!(loaded.life_expectancy, params.life_expectancy);
        assert_eq!(loaded.return_model, params.return_model);
    }

    #[test]
    fn simulate_response_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.trials = Some(12);
        cli.life_expectancy = 60;
        let params = build_parameters(cli).expect("valid parameters");
        let result = run_simulation(&params).expect("simulation runs");

        let response = build_simulate_response(&params, &result, false);
        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"successRate\""));
        assert!(json.contains("\"p50TerminalBalance\""));
        assert!(json.contains("\"worstCase\""));
        assert!(json.contains("\"medianCase\""));
        assert!(json.contains("\"bestCase\""));
        assert!(json.contains("\"endingBalanceReal\""));
        assert!(json.contains("\"model\":\"normal\""));
        assert!(!json.contains("\"trials\""));

        let full = build_simulate_response(&params, &result, true);
        let json = serde_json::to_string(&full).expect("response should serialize");
        assert!(json.contains("\"trials\""));
    }

    #[test]
    fn run_cli_renders_a_report() {
        let output = run_cli([
            "nestegg",
            "--start-year",
            "2025",
            "--current-age",
            "64",
            "--life-expectancy",
            "70",
            "--trials",
            "20",
            "--model",
            "historical",
        ])
        .expect("cli runs");
        let report: serde_json::Value = serde_json::from_str(&output).expect("json report");
        assert_eq!(report["horizonYears"], 7);
        assert_eq!(report["model"], "historical");
        let success = report["summary"]["successCount"].as_u64().expect("count");
        let failure = report["summary"]["failureCount"].as_u64().expect("count");
        assert_eq!(success + failure, 20);
    }
}
