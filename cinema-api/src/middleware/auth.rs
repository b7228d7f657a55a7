use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ADMIN_ROLE: &str = "ADMIN";

/// Identity carried by bearer tokens issued elsewhere.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also arrive as `?token=`.
fn bearer_token(req: &Request) -> Option<String> {
    if let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .map(|Query(q)| q.token)
        .filter(|token| !token.is_empty())
}

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| AppError::Authentication("missing authorization".to_string()))?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Authentication("invalid token".to_string()))?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Layered inside `auth_middleware`.
pub async fn admin_only(req: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = req
        .extensions()
        .get::<Claims>()
        .is_some_and(|claims| claims.role == ADMIN_ROLE);
    if !is_admin {
        return Err(AppError::Authorization("admin only".to_string()));
    }
    Ok(next.run(req).await)
}
