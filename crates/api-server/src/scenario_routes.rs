//! Scenario Analysis API Routes
//!
//! Catalog browsing, scenario analysis and pipeline housekeeping.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use insight_pipeline::{MetricsSnapshot, ScenarioAnalysis};
use scenario_core::{PortfolioSnapshot, ScenarioDefinition, ScenarioResult, UserProfile};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

/// Portfolio reference: a stored portfolio id, or an inline snapshot.
#[derive(Debug, Deserialize)]
pub struct PortfolioRef {
    pub portfolio_id: Option<String>,
    pub portfolio: Option<PortfolioSnapshot>,
}

/// Request for a full analysis
#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub target: PortfolioRef,
    pub scenario_id: String,
    /// Looked up in the profile service when `profile` is absent
    pub user_id: Option<String>,
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    #[serde(flatten)]
    pub target: PortfolioRef,
    pub scenario_id: String,
}

#[derive(Debug, Serialize)]
pub struct ScenarioListResponse {
    pub catalog_version: String,
    pub scenarios: Vec<ScenarioDefinition>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub portfolio_id: String,
    pub invalidated: usize,
}

pub fn scenario_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/scenarios", get(list_scenarios))
        .route("/api/scenarios/:id", get(get_scenario))
        .route("/api/scenario-analysis", post(analyze))
        .route("/api/scenario-analysis/calculate", post(calculate))
        .route("/api/portfolios/:id/cache", delete(invalidate_portfolio))
        .route("/api/metrics", get(metrics))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "catalog_version": state.pipeline.catalog().version(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// List every scenario in the active catalog
async fn list_scenarios(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ScenarioListResponse>>, AppError> {
    let catalog = state.pipeline.catalog();
    Ok(Json(ApiResponse::success(ScenarioListResponse {
        catalog_version: catalog.version().to_string(),
        scenarios: catalog.list().into_iter().cloned().collect(),
    })))
}

async fn get_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ScenarioDefinition>>, AppError> {
    let scenario = state.pipeline.catalog().get_scenario(&id)?.clone();
    Ok(Json(ApiResponse::success(scenario)))
}

fn missing_portfolio() -> AppError {
    AppError::with_status(
        StatusCode::BAD_REQUEST,
        anyhow::anyhow!("either portfolio_id or portfolio is required"),
    )
}

/// Calculate a scenario and explain it
async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalysisRequest>,
) -> Result<Json<ApiResponse<ScenarioAnalysis>>, AppError> {
    let profile = match (req.profile, &req.user_id) {
        (Some(profile), _) => profile,
        (None, Some(user_id)) => state.profiles.get_profile(user_id).await?,
        (None, None) => UserProfile::default(),
    };

    let analysis = match (req.target.portfolio, req.target.portfolio_id) {
        (Some(portfolio), _) => {
            state
                .pipeline
                .analyze_snapshot(&portfolio, &req.scenario_id, profile)
                .await?
        }
        (None, Some(portfolio_id)) => {
            state
                .pipeline
                .analyze(&portfolio_id, &req.scenario_id, profile)
                .await?
        }
        (None, None) => return Err(missing_portfolio()),
    };

    tracing::info!(
        "Scenario analysis {} for {}: impact {:.2}%, insight {}",
        req.scenario_id,
        analysis.result.portfolio_id,
        analysis.result.concentration_adjusted_impact_percentage,
        analysis.insight.source_mode.as_str()
    );

    Ok(Json(ApiResponse::success(analysis)))
}

/// Run the calculator only. Never touches the inference provider.
async fn calculate(
    State(state): State<AppState>,
    Json(req): Json<CalculateRequest>,
) -> Result<Json<ApiResponse<ScenarioResult>>, AppError> {
    let result = match (req.target.portfolio, req.target.portfolio_id) {
        (Some(portfolio), _) => state.pipeline.calculate_snapshot(&portfolio, &req.scenario_id)?,
        (None, Some(portfolio_id)) => state.pipeline.calculate(&portfolio_id, &req.scenario_id).await?,
        (None, None) => return Err(missing_portfolio()),
    };
    Ok(Json(ApiResponse::success(result)))
}

/// Drop cached results for a portfolio after its holdings changed
async fn invalidate_portfolio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<InvalidateResponse>> {
    let invalidated = state.pipeline.invalidate_portfolio(&id);
    tracing::info!("Invalidated {} cached results for portfolio {}", invalidated, id);
    Json(ApiResponse::success(InvalidateResponse {
        portfolio_id: id,
        invalidated,
    }))
}

async fn metrics(State(state): State<AppState>) -> Json<ApiResponse<MetricsSnapshot>> {
    Json(ApiResponse::success(state.pipeline.metrics_snapshot()))
}
