use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use super::{auth, dispatch, AppState};
use crate::models::users::{
    AuthResponse, Claims, LoginRequest, ReferralRequest, RegisterRequest, TaskCompletion,
    UserView,
};
use crate::services::users::UserRequest;
use crate::services::ServiceError;

fn invalid_body(rejection: JsonRejection) -> ServiceError {
    ServiceError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
}

fn parse_user_id(raw: &str) -> Result<i64, ServiceError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ServiceError::BadRequest("Invalid user ID".to_string()))
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let Json(request) = payload.map_err(invalid_body)?;

    let response = dispatch(&state.user_channel, |response| UserRequest::Register {
        request,
        response,
    })
    .await?;

    Ok(Json(response))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let Json(request) = payload.map_err(invalid_body)?;

    let response = dispatch(&state.user_channel, |response| UserRequest::Login {
        request,
        response,
    })
    .await?;

    Ok(Json(response))
}

pub async fn get_user_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<Json<UserView>, ServiceError> {
    let id = parse_user_id(&user_id)?;
    auth::ensure_owner(&state, &claims, id)?;

    let user = dispatch(&state.user_channel, |response| UserRequest::GetStatus {
        id,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserView>>, ServiceError> {
    let users = dispatch(&state.user_channel, |response| UserRequest::Leaderboard {
        response,
    })
    .await?;

    Ok(Json(users))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
    payload: Result<Json<TaskCompletion>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let id = parse_user_id(&user_id)?;
    auth::ensure_owner(&state, &claims, id)?;
    // An unknown user is reported ahead of a bad body.
    let Json(task) = match payload {
        Ok(task) => task,
        Err(rejection) => {
            dispatch(&state.user_channel, |response| UserRequest::GetStatus {
                id,
                response,
            })
            .await?;
            return Err(invalid_body(rejection));
        }
    };

    let user = dispatch(&state.user_channel, |response| UserRequest::CompleteTask {
        id,
        bonus: task.user_bonus,
        response,
    })
    .await?;

    Ok(Json(json!({
        "message": "Bonus added successfully",
        "user_id": user.id,
    })))
}

pub async fn add_referrer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
    payload: Result<Json<ReferralRequest>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let id = parse_user_id(&user_id)?;
    auth::ensure_owner(&state, &claims, id)?;
    let Json(referral) = payload.map_err(invalid_body)?;

    let user = dispatch(&state.user_channel, |response| UserRequest::AddReferrer {
        id,
        referrer_id: referral.referrer_id,
        response,
    })
    .await?;

    Ok(Json(json!({
        "message": "Referrer added successfully",
        "user_id": user.id,
        "referrer_id": user.referrer,
    })))
}
