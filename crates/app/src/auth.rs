use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use pet_registry_core::Principal;

use crate::error::ApiError;
use crate::router::AppState;

/// Verifies HS256 bearer tokens issued by the identity provider.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // Expiry is checked against the application clock in `validate_claims`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Decodes `token` and resolves the principal it was issued for.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| AuthError::Invalid(format!("{err}")))?
            .claims;
        validate_claims(&claims, now)?;
        Ok(Principal {
            id: claims.sub,
            name: claims.name,
            email: claims.email,
        })
    }
}

fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), AuthError> {
    if claims.sub.trim().is_empty() {
        return Err(AuthError::Invalid("missing_subject".to_string()));
    }
    let now_ts = now.timestamp();
    if let Some(nbf) = claims.nbf {
        if now_ts < nbf as i64 {
            return Err(AuthError::Invalid("token_not_yet_valid".to_string()));
        }
    }
    if now_ts >= claims.exp as i64 {
        return Err(AuthError::Expired);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub exp: usize,
    #[serde(default)]
    pub nbf: Option<usize>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is missing")]
    MissingToken,
    #[error("authorization header is not a bearer credential")]
    MalformedHeader,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl AuthError {
    pub fn metric_reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing",
            Self::MalformedHeader => "malformed",
            Self::Expired => "expired",
            Self::Invalid(_) => "invalid",
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Principal resolved from the request's bearer token.
///
/// Rejects the request with `401` before the handler runs.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let outcome = bearer_token(&parts.headers)
            .and_then(|token| state.token_validator().validate(token, state.now()));

        match outcome {
            Ok(principal) => Ok(Self(principal)),
            Err(err) => {
                counter!("auth_rejections_total", "reason" => err.metric_reason()).increment(1);
                debug!(stage = "auth", path = %parts.uri.path(), error = %err, "request rejected");
                Err(ApiError::Unauthenticated)
            }
        }
    }
}
