//! Custom Axum extractors.
//!
//! - `BearerToken`: the `Authorization: Bearer <token>` credential
//! - `IdempotencyKey`: the optional `Idempotency-Key` header, validated
//!
//! ```ignore
//! async fn handler(
//!     token: BearerToken,
//!     idempotency: IdempotencyKey,
//!     Json(body): Json<CreateHoldRequest>,
//! ) -> Result<Json<InventoryUpdateResponse>, AppError> { .. }
//! ```

use crate::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

/// Header carrying the client-chosen idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Bearer credential from the `Authorization` header.
///
/// Rejects with 401 when the header is missing or not a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("Invalid Authorization header"))?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("Expected a bearer token"))?;

        Ok(Self(token.to_string()))
    }
}

/// Optional idempotency key.
///
/// Absent header yields `IdempotencyKey(None)`. A present key must be between
/// 16 and 128 characters, otherwise the request is rejected with 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(IDEMPOTENCY_KEY_HEADER) else {
            return Ok(Self(None));
        };

        let key = raw
            .to_str()
            .map_err(|_| AppError::bad_request("Invalid Idempotency-Key header value"))?;

        if key.len() < 16 || key.len() > 128 {
            return Err(AppError::bad_request(
                "Idempotency-Key must be between 16 and 128 characters",
            ));
        }

        Ok(Self(Some(key.to_string())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[tokio::test]
    async fn bearer_token_is_extracted() {
        let mut parts = parts(
            Request::builder()
                .header(header::AUTHORIZATION, "Bearer agent-token")
                .body(())
                .unwrap(),
        )
        .await;

        let token = BearerToken::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(token.0, "agent-token");
    }

    #[tokio::test]
    async fn missing_or_basic_auth_is_unauthorized() {
        let mut missing = parts(Request::builder().body(()).unwrap()).await;
        let err = BearerToken::from_request_parts(&mut missing, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let mut basic = parts(
            Request::builder()
                .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
                .body(())
                .unwrap(),
        )
        .await;
        let err = BearerToken::from_request_parts(&mut basic, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn idempotency_key_is_optional() {
        let mut parts = parts(Request::builder().body(()).unwrap()).await;
        let key = IdempotencyKey::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(key, IdempotencyKey(None));
    }

    #[tokio::test]
    async fn short_idempotency_key_is_rejected() {
        let mut parts = parts(
            Request::builder()
                .header(IDEMPOTENCY_KEY_HEADER, "short")
                .body(())
                .unwrap(),
        )
        .await;
        let err = IdempotencyKey::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_idempotency_key_is_kept() {
        let mut parts = parts(
            Request::builder()
                .header(IDEMPOTENCY_KEY_HEADER, "550e8400-e29b-41d4-a716-446655440000")
                .body(())
                .unwrap(),
        )
        .await;
        let key = IdempotencyKey::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(
            key.0.as_deref(),
            Some("550e8400-e29b-41d4-a716-446655440000")
        );
    }
}
