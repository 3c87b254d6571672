use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    AccessToken,
    RefreshToken,
    ForgotPasswordToken,
    EmailVerifyToken,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserVerifyStatus {
    Unverified,
    Verified,
    Banned,
}

/// Claims carried by tokens the identity service issues.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub token_type: TokenType,
    pub verify: UserVerifyStatus,
    pub exp: usize,
    pub iat: usize,
}

/// Verifies signature and expiry, then insists on an access token.
pub fn decode_access_token(token: &str, secret: &str) -> Option<TokenClaims> {
    let claims = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?
    .claims;

    (claims.token_type == TokenType::AccessToken).then_some(claims)
}

#[cfg(test)]
pub fn sign_for_test(
    user_id: Uuid,
    token_type: TokenType,
    verify: UserVerifyStatus,
    secret: &str,
) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
    let claims = TokenClaims {
        user_id,
        token_type,
        verify,
        exp: now + 15 * 60,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
