use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::UserStore;
use crate::settings::Settings;

pub mod http;
pub mod tokens;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Hashing error: {0}")]
    Hashing(String),
    #[error("Token error: {0}")]
    Token(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(
    store: Arc<dyn UserStore>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let (user_tx, mut user_rx) = mpsc::channel(512);

    let tokens = Arc::new(tokens::TokenService::new(
        settings.auth.jwt_secret.as_bytes(),
    ));
    let mut user_service = users::UserService::new();

    log::info!("Starting user service.");
    let handler = users::UserRequestHandler::new(
        store,
        tokens.clone(),
        users::AccountPolicy {
            bcrypt_cost: settings.auth.bcrypt_cost,
            allow_negative_bonus: settings.accounts.allow_negative_bonus,
        },
    );
    tokio::spawn(async move {
        user_service.run(handler, &mut user_rx).await;
    });

    log::info!("Starting HTTP server.");
    let state = http::AppState {
        user_channel: user_tx,
        tokens,
        enforce_ownership: settings.auth.enforce_ownership,
    };
    http::start_http_server(state, &settings.server.listen).await
}
