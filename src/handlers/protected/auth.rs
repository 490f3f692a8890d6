use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth;
use crate::handlers::extract::JsonBody;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::account_service;
use crate::types::Role;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MeIdentity {
    pub uid: String,
    pub role: Role,
    pub account: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub identity: MeIdentity,
}

/// GET /auth/me - the caller's claims without token bookkeeping fields.
pub async fn me(user: AuthUser) -> ApiResult<Me> {
    let claims = user.claims;
    Ok(ApiResponse::success(Me {
        identity: MeIdentity {
            uid: claims.uid,
            role: claims.role,
            account: claims.account,
            name: claims.name,
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// POST /auth/logout - revoke the presented access token and, when given,
/// the refresh token issued with it.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<JsonBody<LogoutRequest>>,
) -> ApiResult<()> {
    let mut tx = state.pool.begin().await?;
    account_service::revoke(&mut tx, &user.claims.jti, user.claims.exp).await?;

    if let Some(token) = body.and_then(|JsonBody(b)| b.refresh_token) {
        match auth::decode_refresh_token(&token, &state.config.security) {
            Ok(claims) if claims.uid == user.claims.uid => {
                account_service::revoke(&mut tx, &claims.jti, claims.exp).await?;
            }
            Ok(_) => debug!("Ignoring refresh token of another account on logout"),
            Err(e) => debug!("Ignoring unusable refresh token on logout: {}", e),
        }
    }

    account_service::purge_expired_revocations(&mut tx).await?;
    tx.commit().await?;
    info!("{:?} {} logged out", user.kind(), user.uid());
    Ok(ApiResponse::message("已退出登录"))
}
