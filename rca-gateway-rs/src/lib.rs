// rca-gateway-rs/src/lib.rs
// HTTP front end for the RCA engine.
//
// - POST /rca     analyze a query, or resume one with clarification answers
// - GET  /health  liveness and uptime

pub mod config;
pub mod error;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rca_engine::{AnalysisRequest, RcaEngine, RcaOutcome, ReportStatus};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

pub use config::GatewayConfig;
pub use error::{ApiError, ErrorResponse};

/// Shared application state
pub struct AppState {
    engine: Arc<RcaEngine>,
    service_name: String,
    started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<RcaEngine>, service_name: impl Into<String>) -> Self {
        Self {
            engine,
            service_name: service_name.into(),
            started_at: Instant::now(),
        }
    }
}

/// Body of a successful POST /rca.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RcaResponse {
    Report {
        report: String,
        status: ReportStatus,
        request_id: Uuid,
    },
    Clarification {
        clarification_request: Vec<String>,
        continuation_token: String,
        ambiguity_score: f64,
    },
}

impl From<RcaOutcome> for RcaResponse {
    fn from(outcome: RcaOutcome) -> Self {
        match outcome {
            RcaOutcome::Report(report) => RcaResponse::Report {
                report: report.render(),
                status: report.status,
                request_id: report.request_id,
            },
            RcaOutcome::Clarification {
                request,
                continuation_token,
            } => RcaResponse::Clarification {
                clarification_request: request.rendered(),
                continuation_token,
                ambiguity_score: request.ambiguity_score,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub uptime_seconds: u64,
}

/// Build the router with its middleware stack.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rca", post(rca_handler))
        .route("/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// POST /rca
async fn rca_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<RcaResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state.engine.analyze(request).await?;
    Ok(Json(outcome.into()))
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service_name.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// default `info` filter.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, text_layer) = if json {
        let layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true);
        (Some(layer), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}
