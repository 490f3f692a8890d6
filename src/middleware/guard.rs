//! Role guards as extractors. A handler that takes `RequireAdmin` or
//! `RequireSuperAdmin` only runs for callers with that role; token problems
//! surface earlier as Unauthorized from [`AuthUser`].

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use super::auth::AuthUser;
use crate::error::ApiError;

/// Any admin, super-admins included.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthUser);

/// Super-admins only.
#[derive(Debug, Clone)]
pub struct RequireSuperAdmin(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.role().is_admin() {
            warn!("Admin route {} refused for {} ({})", parts.uri.path(), user.uid(), user.role());
            return Err(ApiError::forbidden("需要管理员权限"));
        }
        Ok(RequireAdmin(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireSuperAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_super_admin() {
            warn!("Super-admin route {} refused for {} ({})", parts.uri.path(), user.uid(), user.role());
            return Err(ApiError::forbidden("需要超级管理员权限"));
        }
        Ok(RequireSuperAdmin(user))
    }
}
