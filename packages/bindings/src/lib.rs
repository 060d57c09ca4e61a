use napi::Result as NapiResult;
use napi_derive::napi;

use lbo_engine_core::scenarios::CancellationToken;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Capital structure & debt schedule
// ---------------------------------------------------------------------------

#[napi]
pub fn build_capital_structure(input_json: String) -> NapiResult<String> {
    let input: lbo_engine_core::capital::CapitalStructureConfig =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        lbo_engine_core::capital::build_capital_structure(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn debt_schedule(input_json: String) -> NapiResult<String> {
    let input: lbo_engine_core::schedule::DebtScheduleInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = lbo_engine_core::schedule::run_debt_schedule(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Waterfall & pipeline
// ---------------------------------------------------------------------------

#[napi]
pub fn distribution_waterfall(input_json: String) -> NapiResult<String> {
    let input: lbo_engine_core::waterfall::WaterfallInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        lbo_engine_core::waterfall::run_waterfall_input(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn run_scenario(input_json: String) -> NapiResult<String> {
    let input: lbo_engine_core::pipeline::ScenarioInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = lbo_engine_core::pipeline::run_scenario(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenario batches
// ---------------------------------------------------------------------------

#[napi]
pub fn run_batch(input_json: String, threads: Option<u32>) -> NapiResult<String> {
    let inputs: Vec<lbo_engine_core::pipeline::ScenarioInput> =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = lbo_engine_core::scenarios::RunnerConfig {
        threads: threads.map(|t| t as usize),
    };
    let report = lbo_engine_core::scenarios::run_batch(&inputs, &config, &CancellationToken::new())
        .map_err(to_napi_error)?;
    serde_json::to_string(&report).map_err(to_napi_error)
}

#[napi]
pub fn sensitivity_analysis(input_json: String) -> NapiResult<String> {
    let input: lbo_engine_core::scenarios::SensitivityInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = lbo_engine_core::scenarios::run_sensitivity(&input, &CancellationToken::new())
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn monte_carlo_simulation(input_json: String) -> NapiResult<String> {
    let input: lbo_engine_core::scenarios::MonteCarloInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = lbo_engine_core::scenarios::run_monte_carlo(&input, &CancellationToken::new())
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
