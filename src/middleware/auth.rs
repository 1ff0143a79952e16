use crate::{auth::verify_jwt, directory::Principal, error::AppError, state::AppState};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authenticates the caller from `Authorization: Bearer <jwt>`, falling back
/// to a `token` query parameter for WebSocket upgrades. The account is
/// reloaded so role changes and deactivation take effect immediately.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized("Vui lòng đăng nhập".to_string()))?;

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Phiên đăng nhập không hợp lệ".to_string()))?;

    let user = state
        .directory
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Không tìm thấy tài khoản".to_string()))?;

    if !user.is_active {
        return Err(AppError::Forbidden("Tài khoản đã bị vô hiệu hóa".to_string()));
    }

    req.extensions_mut().insert(user.principal());

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    if let Some(header) = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        return header.strip_prefix("Bearer ").map(str::to_string);
    }

    req.uri()
        .query()
        .unwrap_or("")
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// The authenticated caller, as placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("Vui lòng đăng nhập".to_string()))
    }
}
