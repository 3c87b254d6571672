use crate::common::response::ApiError;
use crate::common::token::decode_access_token;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract token from header
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_owned());

    let token = match token {
        Some(t) => t,
        None => {
            return Err(ApiError(
                "Unauthorized: Missing or invalid token".to_string(),
                StatusCode::UNAUTHORIZED,
            ));
        }
    };

    // 2. Verify JWT before touching Redis
    let claims = decode_access_token(&token, &state.config.jwt_secret).ok_or_else(|| {
        ApiError(
            "Unauthorized: Invalid access token".to_string(),
            StatusCode::UNAUTHORIZED,
        )
    })?;

    // 3. Check if token is blocked in Redis
    let is_blocked = state.blocklist.is_token_revoked(&token).await.map_err(|e| {
        tracing::error!("Redis error while checking token: {}", e);
        ApiError(
            "Internal Server Error: Redis unavailable".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    })?;

    if is_blocked {
        return Err(ApiError(
            "Unauthorized: Token is blocked/revoked".to_string(),
            StatusCode::UNAUTHORIZED,
        ));
    }

    // 4. Inject claims into request extensions
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
