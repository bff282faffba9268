//! Scenario Analysis API Server
//!
//! Thin axum surface over the insight pipeline: scenario catalog browsing, full
//! scenario analysis (calculation plus explanation), calculation only, cache
//! invalidation and pipeline metrics.

mod memory_store;
mod scenario_routes;

pub use memory_store::{InMemoryPortfolioStore, InMemoryResultStore, StaticProfileService};
pub use scenario_routes::scenario_routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use inference_client::{build_provider, InferenceConfig};
use insight_pipeline::{InsightPipeline, PipelineConfig, PipelineError};
use scenario_core::{ProfileService, ScenarioError};
use scenario_engine::{CompletenessMode, ScenarioCalculator, ScenarioCatalog};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared handler state. Cloned per request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: InsightPipeline,
    pub profiles: Arc<dyn ProfileService>,
}

impl AppState {
    pub fn new(pipeline: InsightPipeline, profiles: Arc<dyn ProfileService>) -> Self {
        Self { pipeline, profiles }
    }
}

/// Envelope for every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error. Pipeline and scenario errors pick their own status code;
/// anything else is a 500 unless set explicitly with [`AppError::with_status`].
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    retry_after_secs: Option<u64>,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            retry_after_secs: None,
            error: error.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn scenario_status(error: &ScenarioError) -> StatusCode {
    match error {
        ScenarioError::InvalidPortfolio(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScenarioError::UnknownScenario(_) | ScenarioError::PortfolioNotFound(_) => StatusCode::NOT_FOUND,
        ScenarioError::ProfileUnavailable(_) | ScenarioError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        ScenarioError::InvalidCatalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn classify(error: &anyhow::Error) -> (StatusCode, Option<u64>) {
    if let Some(e) = error.downcast_ref::<PipelineError>() {
        return match e {
            PipelineError::Input(inner) => (scenario_status(inner), None),
            PipelineError::Collaborator(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            PipelineError::Saturated { retry_after_secs, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(*retry_after_secs))
            }
            PipelineError::Aborted(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
    }
    if let Some(e) = error.downcast_ref::<ScenarioError>() {
        return (scenario_status(e), None);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, None)
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let (status, retry_after_secs) = classify(&error);
        Self {
            status,
            retry_after_secs,
            error,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed ({}): {:#}", self.status, self.error);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, self.error);
        }

        let body = Json(ApiResponse::<()>::error(self.error.to_string()));
        let mut response = (self.status, body).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(scenario_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

/// Assemble catalog, collaborators and pipeline from the environment.
pub fn state_from_env() -> anyhow::Result<AppState> {
    let catalog = match std::env::var("SCENARIO_CATALOG_PATH") {
        Ok(path) => ScenarioCatalog::from_path(&path, CompletenessMode::Strict)
            .with_context(|| format!("failed to load scenario catalog from {}", path))?,
        Err(_) => ScenarioCatalog::seeded()?,
    };
    tracing::info!(
        "Scenario catalog {} loaded ({} scenarios)",
        catalog.version(),
        catalog.len()
    );

    let portfolios = match std::env::var("PORTFOLIO_SEED_PATH") {
        Ok(path) => InMemoryPortfolioStore::from_path(&path)?,
        Err(_) => InMemoryPortfolioStore::new(),
    };
    tracing::info!("{} portfolios seeded", portfolios.len());

    let pipeline_config = PipelineConfig::from_env()?;
    let inference_config = InferenceConfig::from_env()?;
    let provider = build_provider(&inference_config);

    let pipeline = InsightPipeline::new(
        pipeline_config,
        ScenarioCalculator::new(Arc::new(catalog)),
        provider,
        Arc::new(portfolios),
        Arc::new(InMemoryResultStore::new()),
    );

    Ok(AppState::new(pipeline, Arc::new(StaticProfileService::default())))
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let state = state_from_env()?;

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = pipeline.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} expired cache entries", purged);
            }
        }
    });

    let port: u16 = std::env::var("API_PORT")
        .ok()
        .map(|v| v.parse())
        .transpose()
        .context("API_PORT must be a port number")?
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Scenario analysis API listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
