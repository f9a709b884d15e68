use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::models::users::Claims;
use crate::services::tokens::TokenService;
use crate::services::ServiceError;

const BEARER_PREFIX: &str = "Bearer ";

fn bearer_claims(headers: &HeaderMap, tokens: &TokenService) -> Result<Claims, ServiceError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ServiceError::Unauthorized("Authorization header required".to_string()))?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized("Invalid token format".to_string()))?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("Invalid token format".to_string()))?;

    tokens.verify(token).map_err(|e| {
        log::debug!("Rejected bearer token: {}", e);
        ServiceError::Unauthorized("Invalid token".to_string())
    })
}

/// Gate for protected routes. The verified claims are stored in the request
/// extensions for handlers that need the caller's identity.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match bearer_claims(request.headers(), &state.tokens) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Rejects callers acting on an account other than their own, unless
/// ownership enforcement is switched off.
pub fn ensure_owner(state: &AppState, claims: &Claims, user_id: i64) -> Result<(), ServiceError> {
    if state.enforce_ownership && claims.user_id != user_id {
        log::warn!(
            "User {} attempted to act on user {}",
            claims.user_id,
            user_id
        );
        return Err(ServiceError::Forbidden(
            "Token does not belong to this user".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn extracts_claims_from_bearer_header() {
        let tokens = TokenService::new(b"gate-secret");
        let token = tokens.issue(3, "carol").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let claims = bearer_claims(&headers, &tokens).unwrap();
        assert_eq!(claims.user_id, 3);
        assert_eq!(claims.username, "carol");
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        let tokens = TokenService::new(b"gate-secret");
        let token = tokens.issue(3, "carol").unwrap();

        assert!(matches!(
            bearer_claims(&HeaderMap::new(), &tokens),
            Err(ServiceError::Unauthorized(_))
        ));

        for value in [
            "Bearer".to_string(),
            "Bearer ".to_string(),
            format!("bearer {}", token),
            token.clone(),
        ] {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
            assert!(
                matches!(
                    bearer_claims(&headers, &tokens),
                    Err(ServiceError::Unauthorized(_))
                ),
                "{}",
                value
            );
        }
    }
}
