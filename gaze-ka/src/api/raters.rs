//! Rater file management
//!
//! Every mutation swaps in a new rater snapshot and recalculates agreement
//! before responding.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use gaze_common::config::{RaterMode, TomlConfig};
use gaze_common::{AnnotationFile, RaterFile};

use super::{recalculate_session, run_blocking};
use crate::session::{RaterSummary, RunStatus};
use crate::{ApiError, ApiResult, AppState};

/// One uploaded annotation file
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    /// Display name, normally the original file name
    pub name: String,
    /// The annotation document, either as JSON or as a JSON string
    pub content: Value,
}

/// Parse and expand an uploaded file with the configured scheme
pub(crate) fn load_upload(upload: &UploadedFile, config: &TomlConfig) -> ApiResult<RaterFile> {
    let name = upload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("file name must not be empty".to_string()));
    }

    let file = match &upload.content {
        Value::String(text) => AnnotationFile::parse(name, text, &config.scheme)?,
        other => AnnotationFile::from_value(name, other, &config.scheme)?,
    };
    let rater = RaterFile::from_annotation_file(&file, &config.scheme, &config.analysis.expand_options())?;
    Ok(rater)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaterListResponse {
    pub mode: RaterMode,
    pub raters: Vec<RaterSummary>,
}

#[derive(Debug, Serialize)]
pub struct RaterChangeResponse {
    pub rater: RaterSummary,
    pub calculation: RunStatus,
}

/// GET /raters
pub async fn list_raters(State(state): State<AppState>) -> Json<RaterListResponse> {
    let raters = state.session.read().await.raters();
    Json(RaterListResponse {
        mode: state.config.analysis.rater_mode,
        raters: raters.iter().map(RaterSummary::from).collect(),
    })
}

/// POST /raters
pub async fn add_rater(
    State(state): State<AppState>,
    Json(upload): Json<UploadedFile>,
) -> ApiResult<(StatusCode, Json<RaterChangeResponse>)> {
    let name = upload.name.clone();
    let config = Arc::clone(&state.config);
    let rater = run_blocking(move || load_upload(&upload, &config))
        .await
        .map_err(|e| {
            warn!(file = %name, error = %e, "rejected annotation file");
            e
        })?;

    let mut session = state.session.write().await;
    if let Some(allowed) = state.config.analysis.rater_mode.max_raters() {
        if session.raters().len() >= allowed {
            return Err(ApiError::Conflict(format!(
                "{:?} mode accepts at most {} files",
                state.config.analysis.rater_mode, allowed
            )));
        }
    }

    let id = session.add(rater);
    info!(%id, file = %name, "annotation file loaded");
    recalculate_session(&state, &mut session).await?;

    let summary = session
        .find(id)
        .map(RaterSummary::from)
        .ok_or_else(|| ApiError::Internal(format!("rater {} vanished after insert", id)))?;

    Ok((
        StatusCode::CREATED,
        Json(RaterChangeResponse {
            rater: summary,
            calculation: session.last_run().clone(),
        }),
    ))
}

/// DELETE /raters/:id
pub async fn remove_rater(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RaterChangeResponse>> {
    let mut session = state.session.write().await;
    let summary = session
        .find(id)
        .map(RaterSummary::from)
        .ok_or_else(|| ApiError::NotFound(format!("rater {}", id)))?;

    session.remove(id);
    info!(%id, file = %summary.name, "annotation file removed");
    recalculate_session(&state, &mut session).await?;

    Ok(Json(RaterChangeResponse {
        rater: summary,
        calculation: session.last_run().clone(),
    }))
}

/// Build rater routes
pub fn rater_routes() -> Router<AppState> {
    Router::new()
        .route("/raters", get(list_raters).post(add_rater))
        .route("/raters/:id", delete(remove_rater))
}
