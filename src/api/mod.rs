use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AVERAGE_RATE_INCOMES, BracketCalibration, BracketError, DerivedTariff, HistogramBin,
    MARGINAL_CURVE_MAX, MARGINAL_CURVE_STEP, PopulationSummary, RatePoint, RepresentativeDelta,
    SimulationContext, SimulationResult, TariffControl, TariffParameters, load_brackets_file,
};

/// Tariff settings as entered by a user. Every field is optional and falls
/// back to the reference tariff. Rates are given in percent.
#[derive(Args, Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TariffOverrides {
    /// Top of the zero-rate zone (basic allowance)
    #[arg(long)]
    pub zero_threshold: Option<f64>,
    /// End of the first progression zone
    #[arg(long)]
    pub zone2_end: Option<f64>,
    /// End of the second progression zone, where the top rate starts
    #[arg(long)]
    pub zone3_end: Option<f64>,
    /// Start of the rich rate
    #[arg(long)]
    pub zone4_end: Option<f64>,
    /// Marginal rate at the start of zone 2, in percent
    #[arg(long, value_name = "PERCENT")]
    pub entry_rate: Option<f64>,
    /// Marginal rate at the zone 2/3 boundary, in percent (derived when unset)
    #[arg(long, value_name = "PERCENT")]
    pub mid_rate: Option<f64>,
    /// Flat rate of zone 4, in percent
    #[arg(long, value_name = "PERCENT")]
    pub top_rate: Option<f64>,
    /// Flat rate of zone 5, in percent
    #[arg(long, value_name = "PERCENT")]
    pub rich_rate: Option<f64>,
}

/// How an API value maps onto the unit stored on `TariffParameters`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ApiUnit {
    Amount,
    Percent,
    /// Percent in the API, hundredths of a percent when stored.
    EntryBasis,
}

impl ApiUnit {
    fn to_stored(self, value: f64) -> f64 {
        match self {
            ApiUnit::Amount => value,
            ApiUnit::Percent => value / 100.0,
            ApiUnit::EntryBasis => value * 100.0,
        }
    }

    fn from_stored(self, value: f64) -> f64 {
        let api = match self {
            ApiUnit::Amount => value,
            ApiUnit::Percent => value * 100.0,
            ApiUnit::EntryBasis => value / 100.0,
        };
        (api * 1e6).round() / 1e6
    }
}

impl TariffOverrides {
    fn fields(&self) -> [(&'static str, Option<f64>, TariffControl, ApiUnit); 8] {
        [
            ("zeroThreshold", self.zero_threshold, TariffControl::ZeroThreshold, ApiUnit::Amount),
            ("zone2End", self.zone2_end, TariffControl::Zone2End, ApiUnit::Amount),
            ("zone3End", self.zone3_end, TariffControl::Zone3End, ApiUnit::Amount),
            ("zone4End", self.zone4_end, TariffControl::Zone4End, ApiUnit::Amount),
            ("entryRate", self.entry_rate, TariffControl::EntryRateBasis, ApiUnit::EntryBasis),
            ("midRate", self.mid_rate, TariffControl::MidRate, ApiUnit::Percent),
            ("topRate", self.top_rate, TariffControl::Zone4Rate, ApiUnit::Percent),
            ("richRate", self.rich_rate, TariffControl::Zone5Rate, ApiUnit::Percent),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct IncomeQuery {
    income: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    tariff: TariffParameters,
    coefficients: DerivedTariff,
    total_tax: f64,
    baseline_total_tax: f64,
    delta_tax: f64,
    delta_percent: f64,
    baseline: SimulationResult,
    scenario: SimulationResult,
    representative_deltas: Vec<RepresentativeDelta>,
    histogram: Vec<HistogramBin>,
    average_rate_curve: Vec<RatePoint>,
    marginal_rate_curve: Vec<RatePoint>,
    population: PopulationSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResponse {
    population: PopulationSummary,
    brackets: Vec<BracketCalibration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxResponse {
    income: f64,
    tax: f64,
    average_rate_percent: f64,
    marginal_rate_percent: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Applies the overrides to the reference tariff, rejects non-finite or
/// out-of-range values, then repairs the zone ordering.
pub fn build_tariff(overrides: &TariffOverrides) -> Result<TariffParameters, String> {
    let mut params = TariffParameters::reference();

    for (name, value, control, unit) in overrides.fields() {
        let Some(value) = value else {
            continue;
        };
        if !value.is_finite() {
            return Err(format!("{name} must be a finite number"));
        }
        let (min, max) = control.range();
        let stored = unit.to_stored(value);
        if !(min..=max).contains(&stored) {
            return Err(format!(
                "{name} must be between {} and {}, got {value}",
                unit.from_stored(min),
                unit.from_stored(max)
            ));
        }
        params.set(control, stored);
    }

    params.validate().map_err(|e| e.to_string())?;
    Ok(params.normalized())
}

/// Reference context, or one calibrated on the bracket table at `path`.
pub fn build_context(path: Option<&Path>) -> Result<SimulationContext, BracketError> {
    match path {
        Some(path) => {
            SimulationContext::new(load_brackets_file(path)?, TariffParameters::reference())
        }
        None => SimulationContext::reference(),
    }
}

pub fn build_simulate_response(
    context: &SimulationContext,
    params: &TariffParameters,
) -> SimulateResponse {
    let coefficients = params.derive();
    let comparison = context.compare(params);
    SimulateResponse {
        tariff: *params,
        coefficients,
        total_tax: comparison.scenario.total_tax,
        baseline_total_tax: comparison.baseline.total_tax,
        delta_tax: comparison.delta_tax,
        delta_percent: comparison.delta_percent,
        baseline: comparison.baseline,
        scenario: comparison.scenario,
        representative_deltas: context.representative_deltas(params),
        histogram: context.histogram().to_vec(),
        average_rate_curve: coefficients.average_rate_curve(&AVERAGE_RATE_INCOMES),
        marginal_rate_curve: coefficients
            .marginal_rate_curve(MARGINAL_CURVE_MAX, MARGINAL_CURVE_STEP),
        population: context.population_summary(),
    }
}

pub fn build_calibration_response(context: &SimulationContext) -> CalibrationResponse {
    CalibrationResponse {
        population: context.population_summary(),
        brackets: context.calibration_report(),
    }
}

pub fn build_tax_response(income: f64, params: &TariffParameters) -> Result<TaxResponse, String> {
    if !income.is_finite() || income < 0.0 {
        return Err("income must be a finite number >= 0".to_string());
    }
    let tariff = params.derive();
    Ok(TaxResponse {
        income,
        tax: tariff.tax(income),
        average_rate_percent: tariff.average_rate_percent(income),
        marginal_rate_percent: tariff.marginal_rate_percent(income, MARGINAL_CURVE_STEP),
    })
}

pub fn router(context: Arc<SimulationContext>) -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/calibration", get(calibration_handler))
        .route("/api/tax", get(tax_handler))
        .fallback(not_found_handler)
        .with_state(context)
}

pub async fn run_http_server(port: u16, context: Arc<SimulationContext>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(context);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "tariff simulation API listening");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(context): State<Arc<SimulationContext>>,
    payload: Result<Query<TariffOverrides>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(overrides)) => simulate_handler_impl(&context, &overrides),
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

async fn simulate_post_handler(
    State(context): State<Arc<SimulationContext>>,
    payload: Result<Json<TariffOverrides>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(overrides)) => simulate_handler_impl(&context, &overrides),
        Err(rejection) => error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

fn simulate_handler_impl(context: &SimulationContext, overrides: &TariffOverrides) -> Response {
    match build_tariff(overrides) {
        Ok(params) => json_response(StatusCode::OK, build_simulate_response(context, &params)),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn calibration_handler(State(context): State<Arc<SimulationContext>>) -> Response {
    json_response(StatusCode::OK, build_calibration_response(&context))
}

async fn tax_handler(
    income: Result<Query<IncomeQuery>, QueryRejection>,
    overrides: Result<Query<TariffOverrides>, QueryRejection>,
) -> Response {
    let (Query(income), Query(overrides)) = match (income, overrides) {
        (Ok(income), Ok(overrides)) => (income, overrides),
        (Err(rejection), _) | (_, Err(rejection)) => {
            return error_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };
    let response =
        build_tariff(&overrides).and_then(|params| build_tax_response(income.income, &params));
    match response {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
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
fn overrides_from_json(json: &str) -> Result<TariffOverrides, String> {
    serde_json::from_str::<TariffOverrides>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))
}
