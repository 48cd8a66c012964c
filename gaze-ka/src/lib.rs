//! gaze-ka library - Kappa Analysis service
//!
//! Holds uploaded annotation files in memory, recalculates inter-rater
//! agreement whenever the set changes, and serves reports and timeline
//! layouts over HTTP.

pub mod api;
pub mod display;
pub mod error;
pub mod logging;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use gaze_common::config::TomlConfig;

use crate::display::Palette;
use crate::session::Session;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration (analysis settings and category scheme)
    pub config: Arc<TomlConfig>,
    /// Colours handed to the presentation layer
    pub palette: Arc<Palette>,
    /// Loaded files and last result
    pub session: Arc<RwLock<Session>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: TomlConfig) -> Self {
        let palette = Palette::for_scheme(&config.scheme);
        Self {
            config: Arc::new(config),
            palette: Arc::new(palette),
            session: Arc::new(RwLock::new(Session::new())),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::rater_routes())
        .merge(api::kappa_routes())
        .merge(api::timeline_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
