//! HTTP API handlers for gaze-ka

pub mod health;
pub mod kappa;
pub mod raters;
pub mod timeline;

pub use health::health_routes;
pub use kappa::kappa_routes;
pub use raters::rater_routes;
pub use timeline::timeline_routes;

use std::sync::Arc;

use gaze_common::aggregate::analyze;

use crate::session::Session;
use crate::{ApiError, ApiResult, AppState};

/// Run CPU-bound work (expansion, agreement) off the async workers
pub(crate) async fn run_blocking<T, F>(work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ApiResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))?
}

/// Recalculate agreement over the session's current files
pub(crate) async fn recalculate_session(state: &AppState, session: &mut Session) -> ApiResult<()> {
    let files = session.files();
    let config = Arc::clone(&state.config);
    let outcome =
        run_blocking(move || Ok(analyze(&files, &config.analysis, &config.scheme)?)).await?;
    session.record(outcome);
    Ok(())
}
