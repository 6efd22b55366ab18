//! HTTP API over the session service.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use courier_core::service::SessionService;
use courier_core::submission::SubmissionStore;
use tower_http::timeout::TimeoutLayer;

pub use handlers::{ControlRequest, ControlResponse, CreateSessionResponse, ListSessionsResponse};

#[derive(Clone)]
pub struct AppState {
    pub service: SessionService,
    pub submissions: Arc<SubmissionStore>,
}

impl AppState {
    pub fn new(service: SessionService, submissions: SubmissionStore) -> Self {
        Self {
            service,
            submissions: Arc::new(submissions),
        }
    }
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let api_v1 = Router::new()
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/sessions/{key}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{key}/control", post(handlers::control_session))
        .route("/sessions/{key}/logs", get(handlers::download_logs))
        .route("/submissions", post(handlers::create_submission))
        .with_state(state);

    Router::new()
        .route("/livez", get(handlers::livez))
        .nest("/api/v1", api_v1)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
