//! Agreement results
//!
//! `GET /kappa` and `POST /kappa/recalculate` work on the loaded rater set.
//! `POST /kappa/analyze` is stateless: it runs one batch and touches nothing.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use gaze_common::aggregate::{analyze, AgreementReport, AnalysisOutcome};
use gaze_common::config::{AnalysisConfig, RaterMode};

use super::raters::{load_upload, UploadedFile};
use super::{recalculate_session, run_blocking};
use crate::session::RunStatus;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct KappaResponse {
    #[serde(flatten)]
    pub calculation: RunStatus,
    pub raters: usize,
    /// Last complete report, possibly older than `calculation`
    pub report: Option<AgreementReport>,
}

async fn current(state: &AppState) -> KappaResponse {
    let session = state.session.read().await;
    KappaResponse {
        calculation: session.last_run().clone(),
        raters: session.raters().len(),
        report: session.last_report().cloned(),
    }
}

/// GET /kappa
pub async fn get_kappa(State(state): State<AppState>) -> Json<KappaResponse> {
    Json(current(&state).await)
}

/// POST /kappa/recalculate
pub async fn recalculate(State(state): State<AppState>) -> ApiResult<Json<KappaResponse>> {
    {
        let mut session = state.session.write().await;
        recalculate_session(&state, &mut session).await?;
    }
    Ok(Json(current(&state).await))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub files: Vec<UploadedFile>,
    /// Overrides the configured rater mode for this batch
    #[serde(default)]
    pub mode: Option<RaterMode>,
}

/// POST /kappa/analyze
pub async fn analyze_batch(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisOutcome>> {
    if request.files.is_empty() {
        return Err(ApiError::BadRequest("no files supplied".to_string()));
    }

    let config = Arc::clone(&state.config);
    let count = request.files.len();
    let outcome = run_blocking(move || {
        let raters = request
            .files
            .iter()
            .map(|upload| load_upload(upload, &config))
            .collect::<ApiResult<Vec<_>>>()?;

        let analysis = AnalysisConfig {
            rater_mode: request.mode.unwrap_or(config.analysis.rater_mode),
            ..config.analysis.clone()
        };
        Ok(analyze(&raters, &analysis, &config.scheme)?)
    })
    .await?;
    info!(files = count, "{}", outcome.summary());

    Ok(Json(outcome))
}

/// Build agreement routes
pub fn kappa_routes() -> Router<AppState> {
    Router::new()
        .route("/kappa", get(get_kappa))
        .route("/kappa/recalculate", post(recalculate))
        .route("/kappa/analyze", post(analyze_batch))
}
