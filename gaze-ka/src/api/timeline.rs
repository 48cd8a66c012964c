//! Timeline layout and display palette

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gaze_common::Subject;

use crate::display::{timeline_segments, Palette, TimelineSegment};
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_WIDTH: u32 = 800;
const MAX_WIDTH: u32 = 16_384;

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub width: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResponse {
    pub id: Uuid,
    pub name: String,
    pub total_frames: u32,
    pub width: u32,
    pub background: String,
    pub doctor: Vec<TimelineSegment>,
    pub patient: Vec<TimelineSegment>,
}

/// GET /raters/:id/timeline?width=
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<TimelineResponse>> {
    let width = query.width.unwrap_or(DEFAULT_WIDTH);
    if width == 0 || width > MAX_WIDTH {
        return Err(ApiError::BadRequest(format!(
            "width must be between 1 and {}",
            MAX_WIDTH
        )));
    }

    let session = state.session.read().await;
    let rater = session
        .find(id)
        .ok_or_else(|| ApiError::NotFound(format!("rater {}", id)))?;
    let file = &rater.file;
    let palette = &state.palette;

    Ok(Json(TimelineResponse {
        id,
        name: file.name.clone(),
        total_frames: file.total_frames,
        width,
        background: palette.background.clone(),
        doctor: timeline_segments(&file.doctor, Subject::Doctor, file.total_frames, width, palette),
        patient: timeline_segments(&file.patient, Subject::Patient, file.total_frames, width, palette),
    }))
}

/// GET /palette
pub async fn get_palette(State(state): State<AppState>) -> Json<Palette> {
    Json(state.palette.as_ref().clone())
}

/// Build timeline routes
pub fn timeline_routes() -> Router<AppState> {
    Router::new()
        .route("/raters/:id/timeline", get(get_timeline))
        .route("/palette", get(get_palette))
}
