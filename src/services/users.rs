use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::tokens::TokenService;
use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{
    AuthResponse, LoginRequest, NewUser, RegisterRequest, User, UserView,
};
use crate::repositories::{BalanceUpdate, UserStore, LEADERBOARD_LIMIT};

pub enum UserRequest {
    Register {
        request: RegisterRequest,
        response: oneshot::Sender<Result<AuthResponse, ServiceError>>,
    },
    Login {
        request: LoginRequest,
        response: oneshot::Sender<Result<AuthResponse, ServiceError>>,
    },
    GetStatus {
        id: i64,
        response: oneshot::Sender<Result<UserView, ServiceError>>,
    },
    CompleteTask {
        id: i64,
        bonus: i64,
        response: oneshot::Sender<Result<UserView, ServiceError>>,
    },
    AddReferrer {
        id: i64,
        referrer_id: i64,
        response: oneshot::Sender<Result<UserView, ServiceError>>,
    },
    Leaderboard {
        response: oneshot::Sender<Result<Vec<UserView>, ServiceError>>,
    },
}

/// bcrypt only looks at this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Clone, Copy, Debug)]
pub struct AccountPolicy {
    pub bcrypt_cost: u32,
    pub allow_negative_bonus: bool,
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    policy: AccountPolicy,
}

fn database_error(e: anyhow::Error) -> ServiceError {
    log::error!("User store failure: {:#}", e);
    ServiceError::Database(e.to_string())
}

fn user_not_found(id: i64) -> ServiceError {
    ServiceError::NotFound(format!("User {} not found", id))
}

impl UserRequestHandler {
    pub fn new(
        repository: Arc<dyn UserStore>,
        tokens: Arc<TokenService>,
        policy: AccountPolicy,
    ) -> Self {
        UserRequestHandler {
            repository,
            tokens,
            policy,
        }
    }

    async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        if request.username.is_empty() {
            return Err(ServiceError::BadRequest("username must not be empty".to_string()));
        }
        if request.password.is_empty() {
            return Err(ServiceError::BadRequest("password must not be empty".to_string()));
        }

        // Skips the hashing cost for obvious duplicates; the insert below is
        // what actually guarantees uniqueness.
        if self
            .repository
            .get_user_by_username(&request.username)
            .await
            .map_err(database_error)?
            .is_some()
        {
            log::warn!("Registration rejected, username {:?} exists", request.username);
            return Err(ServiceError::Conflict("User already exists".to_string()));
        }

        let password_hash = self.hash_password(request.password).await?;

        let user = self
            .repository
            .insert_user(NewUser {
                username: request.username.clone(),
                password_hash,
                referrer: request.referrer,
            })
            .await
            .map_err(database_error)?
            .ok_or_else(|| {
                log::warn!("Registration lost race for username {:?}", request.username);
                ServiceError::Conflict("User already exists".to_string())
            })?;

        log::info!("Registered user {} ({})", user.id, user.username);
        self.auth_response(&user)
    }

    async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid credentials".to_string());

        let Some(user) = self
            .repository
            .get_user_by_username(&request.username)
            .await
            .map_err(database_error)?
        else {
            log::warn!("Login failed for unknown user {:?}", request.username);
            return Err(invalid());
        };

        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || {
            bcrypt::non_truncating_verify(request.password, &hash)
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
        // Nothing longer than the bcrypt input limit can ever have been stored.
        let matches = match matches {
            Ok(matches) => matches,
            Err(bcrypt::BcryptError::Truncation(_)) => false,
            Err(e) => return Err(ServiceError::Hashing(e.to_string())),
        };

        if !matches {
            log::warn!("Login failed for user {}", user.id);
            return Err(invalid());
        }

        self.auth_response(&user)
    }

    async fn get_status(&self, id: i64) -> Result<UserView, ServiceError> {
        self.repository
            .get_user_by_id(id)
            .await
            .map_err(database_error)?
            .map(UserView::from)
            .ok_or_else(|| user_not_found(id))
    }

    async fn complete_task(&self, id: i64, bonus: i64) -> Result<UserView, ServiceError> {
        if bonus < 0 && !self.policy.allow_negative_bonus {
            return Err(ServiceError::BadRequest(
                "user_bonus must not be negative".to_string(),
            ));
        }

        match self
            .repository
            .increment_balance(id, bonus)
            .await
            .map_err(database_error)?
        {
            BalanceUpdate::Applied(user) => Ok(UserView::from(user)),
            BalanceUpdate::Refused(user) => {
                log::warn!(
                    "Refused bonus {} for user {}, balance is {}",
                    bonus,
                    id,
                    user.balance
                );
                Err(ServiceError::BadRequest(
                    "balance cannot go below zero".to_string(),
                ))
            }
            BalanceUpdate::NotFound => Err(user_not_found(id)),
        }
    }

    async fn add_referrer(&self, id: i64, referrer_id: i64) -> Result<UserView, ServiceError> {
        if id == referrer_id {
            return Err(ServiceError::BadRequest(
                "a user cannot be its own referrer".to_string(),
            ));
        }

        self.repository
            .set_referrer(id, referrer_id)
            .await
            .map_err(database_error)?
            .map(UserView::from)
            .ok_or_else(|| user_not_found(id))
    }

    async fn leaderboard(&self) -> Result<Vec<UserView>, ServiceError> {
        let users = self
            .repository
            .top_by_balance(LEADERBOARD_LIMIT)
            .await
            .map_err(database_error)?;

        Ok(users.into_iter().map(UserView::from).collect())
    }

    async fn hash_password(&self, password: String) -> Result<String, ServiceError> {
        let cost = self.policy.bcrypt_cost;

        tokio::task::spawn_blocking(move || bcrypt::non_truncating_hash(password, cost))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| match e {
                bcrypt::BcryptError::Truncation(_) => ServiceError::BadRequest(format!(
                    "password must be at most {} bytes",
                    MAX_PASSWORD_BYTES
                )),
                e => ServiceError::Hashing(e.to_string()),
            })
    }

    fn auth_response(&self, user: &User) -> Result<AuthResponse, ServiceError> {
        let token = self
            .tokens
            .issue(user.id, &user.username)
            .map_err(|e| ServiceError::Token(e.to_string()))?;

        Ok(AuthResponse { token, id: user.id })
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register { request, response } => {
                let result = self.register(request).await;
                let _ = response.send(result);
            }
            UserRequest::Login { request, response } => {
                let result = self.login(request).await;
                let _ = response.send(result);
            }
            UserRequest::GetStatus { id, response } => {
                let user = self.get_status(id).await;
                let _ = response.send(user);
            }
            UserRequest::CompleteTask {
                id,
                bonus,
                response,
            } => {
                let user = self.complete_task(id, bonus).await;
                let _ = response.send(user);
            }
            UserRequest::AddReferrer {
                id,
                referrer_id,
                response,
            } => {
                let user = self.add_referrer(id, referrer_id).await;
                let _ = response.send(user);
            }
            UserRequest::Leaderboard { response } => {
                let users = self.leaderboard().await;
                let _ = response.send(users);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
