//! Session tokens.
//!
//! Access tokens carry the identity and role of the caller; refresh tokens
//! carry only enough to look the account up again. Both are HS256 JWTs signed
//! with the configured secret.

pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::types::{AccountKind, Role};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    MissingToken(String),

    #[error("token has expired")]
    Expired,

    #[error("token has been revoked")]
    Revoked,

    #[error("{0}")]
    InvalidToken(String),

    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    Encoding(String),

    #[error("password hashing error: {0}")]
    Hashing(String),
}

/// Who the caller is, independent of any particular token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub role: Role,
    pub account: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub role: Role,
    pub account: String,
    pub name: Option<String>,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            kind: self.kind,
            role: self.role,
            account: self.account.clone(),
            name: self.name.clone(),
        }
    }
}

/// Refresh claims reject unknown fields, so an access token never decodes
/// as a refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn encoding_key(security: &SecurityConfig) -> Result<EncodingKey, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    Ok(EncodingKey::from_secret(security.jwt_secret.as_bytes()))
}

fn decoding_key(security: &SecurityConfig) -> Result<DecodingKey, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    Ok(DecodingKey::from_secret(security.jwt_secret.as_bytes()))
}

fn validation() -> Validation {
    let mut validation = Validation::default();
    validation.validate_nbf = true;
    validation.leeway = 0;
    validation
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidToken(err.to_string()),
    }
}

pub fn issue_access_token(identity: &Identity, security: &SecurityConfig) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = AccessClaims {
        uid: identity.uid.clone(),
        kind: identity.kind,
        role: identity.role,
        account: identity.account.clone(),
        name: identity.name.clone(),
        exp: (now + Duration::hours(security.access_token_hours)).timestamp(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(&Header::default(), &claims, &encoding_key(security)?)
        .map_err(|e| AuthError::Encoding(e.to_string()))
}

pub fn issue_refresh_token(
    uid: &str,
    kind: AccountKind,
    security: &SecurityConfig,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = RefreshClaims {
        uid: uid.to_string(),
        kind,
        exp: (now + Duration::days(security.refresh_token_days)).timestamp(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(&Header::default(), &claims, &encoding_key(security)?)
        .map_err(|e| AuthError::Encoding(e.to_string()))
}

pub fn issue_token_pair(identity: &Identity, security: &SecurityConfig) -> Result<TokenPair, AuthError> {
    Ok(TokenPair {
        access_token: issue_access_token(identity, security)?,
        refresh_token: issue_refresh_token(&identity.uid, identity.kind, security)?,
    })
}

pub fn decode_access_token(token: &str, security: &SecurityConfig) -> Result<AccessClaims, AuthError> {
    decode::<AccessClaims>(token, &decoding_key(security)?, &validation())
        .map(|data| data.claims)
        .map_err(map_decode_error)
}

pub fn decode_refresh_token(token: &str, security: &SecurityConfig) -> Result<RefreshClaims, AuthError> {
    decode::<RefreshClaims>(token, &decoding_key(security)?, &validation())
        .map(|data| data.claims)
        .map_err(map_decode_error)
}

/// Mint a replacement access token when `claims` expire within the configured
/// window. The new token keeps the identity and gets fresh time fields and jti.
pub fn renew_if_expiring(
    claims: &AccessClaims,
    security: &SecurityConfig,
    now: i64,
) -> Result<Option<String>, AuthError> {
    let threshold = security.refresh_if_expires_in_minutes * 60;
    if claims.exp - now >= threshold {
        return Ok(None);
    }
    issue_access_token(&claims.identity(), security).map(Some)
}

/// Pull the bearer token out of an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or_else(|| AuthError::MissingToken("Missing Authorization Header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::MissingToken("Missing 'Bearer' type in 'Authorization' header".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingToken("Empty bearer token".to_string()));
    }
    Ok(token)
}
