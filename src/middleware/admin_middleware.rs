use axum::{extract::Request, middleware::Next, response::Response};

use crate::{directory::Role, error::AppError, middleware::AuthUser};

/// Must run after `auth_middleware`.
pub async fn admin_middleware(
    AuthUser(principal): AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if principal.role != Role::Admin {
        tracing::debug!("Non-admin {} denied admin route", principal.id);
        return Err(AppError::Forbidden(
            "Chỉ quản trị viên mới có quyền truy cập".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
