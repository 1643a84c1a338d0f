//! Extractors for the identity supplied by the platform auth layer.
//!
//! This workspace performs no authentication. The platform's auth
//! middleware (session validation, role lookup) runs upstream and inserts
//! an [`AuthUser`] into the request extensions; these extractors only read
//! it back out and enforce role requirements at the type level.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use vigil_core::error::CoreError;
use vigil_core::types::DbId;

use crate::error::AppError;

/// Role name the operator endpoints require.
pub const ROLE_ADMIN: &str = "admin";

/// Authenticated actor for the current request.
///
/// Use this as an extractor parameter in any handler that requires an
/// authenticated caller:
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(actor_id = user.actor_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The actor's internal database id.
    pub actor_id: DbId,
    /// The session the request was issued under.
    pub session_id: String,
    /// The actor's role name (e.g. `"admin"`, `"operator"`).
    pub role: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "No authenticated actor on request".into(),
            ))
        })
    }
}

/// Requires the `admin` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(user): RequireAdmin) -> AppResult<Json<()>> {
///     // user is guaranteed to be an admin here
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub AuthUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != ROLE_ADMIN {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
