use crate::common::response::ApiError;
use crate::common::token::{TokenClaims, UserVerifyStatus};
use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Must run after `auth_middleware`, which provides the claims.
pub async fn verified_guard(
    Extension(claims): Extension<TokenClaims>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if claims.verify != UserVerifyStatus::Verified {
        return Err(ApiError(
            "Forbidden: Verified account required".to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    Ok(next.run(req).await)
}
