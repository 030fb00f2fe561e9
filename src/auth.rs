use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    models::Role,
};

/// Local-only header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Local-only header carrying the caller's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Claims
///
/// The JWT payload issued by the identity provider. This service only
/// validates tokens; it never issues them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID.
    pub sub: Uuid,
    /// The caller's authorization class. Unknown role strings fail decoding.
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: who the caller is and
/// which `Role` the access engine should evaluate for them.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, `x-user-id` + `x-user-role` headers are
///    accepted as-is.
/// 2. Otherwise a `Bearer` JWT is required, signature and expiry validated.
///
/// Rejection: `401 Unauthorized` on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            if let Some(user) = local_bypass(parts) {
                return Ok(user);
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!("Rejected bearer token: {:?}", e.kind());
            StatusCode::UNAUTHORIZED
        })?;

        Ok(AuthUser {
            id: token_data.claims.sub,
            role: token_data.claims.role,
        })
    }
}

/// Reads the development identity headers. Both must be present and valid.
fn local_bypass(parts: &Parts) -> Option<AuthUser> {
    let header_str = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

    let id = Uuid::parse_str(header_str(USER_ID_HEADER)?).ok()?;
    let role = header_str(USER_ROLE_HEADER)?.parse().ok()?;
    Some(AuthUser { id, role })
}
