use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::tokens::TokenService;
use super::users::UserRequest;
use super::ServiceError;

mod auth;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub user_channel: mpsc::Sender<UserRequest>,
    pub tokens: Arc<TokenService>,
    /// When set, `/users/{id}/...` only accepts a token issued to user `id`.
    pub enforce_ownership: bool,
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Hashing(_)
            | ServiceError::Token(_)
            | ServiceError::Database(_)
            | ServiceError::Communication(_, _)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ServiceError::BadRequest(details)
            | ServiceError::Unauthorized(details)
            | ServiceError::Forbidden(details)
            | ServiceError::Conflict(details)
            | ServiceError::NotFound(details) => json!({
                "error": status.canonical_reason().unwrap_or("Error"),
                "details": details,
            }),
            _ => {
                log::error!("Request failed: {}", self);
                json!({
                    "error": "Internal server error",
                    "details": "Internal server error.",
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Sends a request to the user service and waits for its reply.
async fn dispatch<T>(
    channel: &mpsc::Sender<UserRequest>,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> UserRequest,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("UserService".to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication("UserService".to_string(), e.to_string()))?
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users/leaderboard", get(users::get_leaderboard))
        .route("/users/{id}/status", get(users::get_user_status))
        .route("/users/{id}/task/complete", post(users::complete_task))
        .route("/users/{id}/referrer", post(users::add_referrer))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/health", get(|| async { "OK" }))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(state: AppState, listen: &str) -> Result<(), anyhow::Error> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
