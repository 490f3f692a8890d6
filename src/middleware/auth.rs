use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use crate::auth::{self, AccessClaims, Identity, RefreshClaims};
use crate::error::ApiError;
use crate::services::account_service;
use crate::types::{AccountKind, Role};
use crate::AppState;

/// Response header carrying a freshly minted access token when the presented
/// one was close to expiry.
pub static NEW_ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-new-access-token");

/// Authenticated caller, decoded from a valid access token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub claims: AccessClaims,
}

impl AuthUser {
    pub fn uid(&self) -> &str {
        &self.claims.uid
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn kind(&self) -> AccountKind {
        self.claims.kind
    }

    pub fn identity(&self) -> Identity {
        self.claims.identity()
    }

    pub fn is_super_admin(&self) -> bool {
        self.claims.role.is_super_admin()
    }

    /// Numeric student id; callers that are not students are refused.
    pub fn student_id(&self) -> Result<i64, ApiError> {
        if self.claims.kind != AccountKind::Student {
            return Err(ApiError::forbidden("仅学生可访问"));
        }
        self.claims
            .uid
            .parse()
            .map_err(|_| ApiError::not_found("学生不存在"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("未携带令牌: Missing Authorization Header"))
    }
}

fn authorization(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Validates the access token, rejects revoked ones, and injects [`AuthUser`].
/// After the handler ran, tokens about to expire are renewed through
/// [`NEW_ACCESS_TOKEN_HEADER`]; renewal failures never affect the response.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let security = &state.config.security;

    let token = auth::bearer_token(authorization(&request))?;
    let claims = auth::decode_access_token(token, security)?;

    {
        let mut conn = state.pool.acquire().await?;
        if account_service::is_revoked(&mut conn, &claims.jti).await? {
            return Err(auth::AuthError::Revoked.into());
        }
    }

    request.extensions_mut().insert(AuthUser {
        claims: claims.clone(),
    });

    let mut response = next.run(request).await;

    match auth::renew_if_expiring(&claims, security, Utc::now().timestamp()) {
        Ok(Some(fresh)) => match HeaderValue::from_str(&fresh) {
            Ok(value) => {
                debug!("Renewed access token for {:?} {}", claims.kind, claims.uid);
                response
                    .headers_mut()
                    .insert(NEW_ACCESS_TOKEN_HEADER.clone(), value);
            }
            Err(e) => debug!("Renewed token is not a valid header value: {}", e),
        },
        Ok(None) => {}
        Err(e) => debug!("Skipping access token renewal: {}", e),
    }

    Ok(response)
}

/// Guards `/auth/refresh`: only a valid, unrevoked refresh token passes.
/// The decoded [`RefreshClaims`] are injected for the handler.
pub async fn refresh_token_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = auth::bearer_token(authorization(&request))?;
    let claims: RefreshClaims = auth::decode_refresh_token(token, &state.config.security)?;

    {
        let mut conn = state.pool.acquire().await?;
        if account_service::is_revoked(&mut conn, &claims.jti).await? {
            return Err(auth::AuthError::Revoked.into());
        }
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

