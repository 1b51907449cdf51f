//! Replay of responses for repeated `Idempotency-Key` requests.
//!
//! Mutating endpoints run through [`IdempotencyCache::run`]. The first
//! request with a key executes and its response is cached; a repeat with the
//! same key from the same actor on the same method and path gets the cached
//! response without executing again. A key reused on another endpoint runs
//! that endpoint. Errors are not cached: a failed request may be retried.
//!
//! ```text
//! POST /api/holds
//! Idempotency-Key: 550e8400-e29b-41d4-a716-446655440000
//! Authorization: Bearer <token>
//! ```

use crate::access::SessionContext;
use axum::{
    Json, async_trait,
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use boxoffice_web::{AppError, IdempotencyKey};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Header set on replayed responses
pub const REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// The request's `Idempotency-Key` together with the endpoint it was sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Idempotency {
    key: IdempotencyKey,
    target: String,
}

impl Idempotency {
    /// Key sent to `method path`
    #[must_use]
    pub fn new(key: IdempotencyKey, method: &str, path: &str) -> Self {
        Self {
            key,
            target: format!("{method} {path}"),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Idempotency
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let key = IdempotencyKey::from_request_parts(parts, state).await?;
        // Nested routers see a stripped path; the original keeps the prefix.
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path().to_string(), |uri| uri.path().to_string());
        Ok(Self::new(key, parts.method.as_str(), &path))
    }
}

/// A JSON response that can be cached and replayed.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: serde_json::Value,
    replayed: bool,
}

impl ApiResponse {
    /// Serialize `body` with `status`.
    ///
    /// # Errors
    ///
    /// 500 if `body` cannot be serialized.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, AppError> {
        let body = serde_json::to_value(body)
            .map_err(|e| AppError::internal("Failed to serialize response").with_source(e.into()))?;
        Ok(Self {
            status,
            body,
            replayed: false,
        })
    }

    /// 200 OK with `body`.
    ///
    /// # Errors
    ///
    /// 500 if `body` cannot be serialized.
    pub fn ok<T: Serialize>(body: &T) -> Result<Self, AppError> {
        Self::json(StatusCode::OK, body)
    }

    /// Status code
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if self.replayed {
            response
                .headers_mut()
                .insert(REPLAYED_HEADER, axum::http::HeaderValue::from_static("true"));
        }
        response
    }
}

#[derive(Debug)]
struct CachedResponse {
    response: ApiResponse,
    stored_at: Instant,
}

/// In-process idempotency cache with a time-to-live.
#[derive(Debug, Clone)]
pub struct IdempotencyCache {
    entries: Arc<Mutex<HashMap<String, CachedResponse>>>,
    ttl: Duration,
}

impl IdempotencyCache {
    /// Cache keeping responses for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn scoped(ctx: &SessionContext, target: &str, key: &str) -> String {
        format!("idempotency:{}:{target}:{key}", ctx.actor_label())
    }

    fn lookup(&self, scoped: &str) -> Option<ApiResponse> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let ttl = self.ttl;
        entries.retain(|_, cached| cached.stored_at.elapsed() < ttl);
        entries.get(scoped).map(|cached| ApiResponse {
            replayed: true,
            ..cached.response.clone()
        })
    }

    fn store(&self, scoped: String, response: &ApiResponse) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                scoped,
                CachedResponse {
                    response: response.clone(),
                    stored_at: Instant::now(),
                },
            );
    }

    /// Run `operation` unless a response for this key was already produced.
    ///
    /// # Errors
    ///
    /// Whatever `operation` returns; errors are not cached.
    pub async fn run<F, Fut>(
        &self,
        ctx: &SessionContext,
        idempotency: Idempotency,
        operation: F,
    ) -> Result<ApiResponse, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ApiResponse, AppError>>,
    {
        let Some(key) = idempotency.key.0 else {
            return operation().await;
        };

        let scoped = Self::scoped(ctx, &idempotency.target, &key);
        if let Some(cached) = self.lookup(&scoped) {
            tracing::debug!(idempotency_key = %key, "Replaying cached response");
            return Ok(cached);
        }

        let response = operation().await?;
        self.store(scoped, &response);
        Ok(response)
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::access::{Identity, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(email: &str) -> SessionContext {
        SessionContext::new(Identity::new(email, email, vec![Role::Customer]), None)
    }

    fn key() -> Idempotency {
        keyed("POST", "/api/holds")
    }

    fn keyed(method: &str, path: &str) -> Idempotency {
        Idempotency::new(
            IdempotencyKey(Some("retry-key-0000000001".to_string())),
            method,
            path,
        )
    }

    #[tokio::test]
    async fn repeated_key_replays_without_running() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        let runs = AtomicUsize::new(0);
        let caller = ctx("buyer@example.com");

        for _ in 0..2 {
            let response = cache
                .run(&caller, key(), || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    ApiResponse::json(StatusCode::CREATED, &serde_json::json!({"ok": true}))
                })
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_actor() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        let runs = AtomicUsize::new(0);

        for email in ["a@example.com", "b@example.com"] {
            cache
                .run(&ctx(email), key(), || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    ApiResponse::ok(&"done")
                })
                .await
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_endpoint() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        let runs = AtomicUsize::new(0);
        let caller = ctx("buyer@example.com");

        for target in [
            keyed("POST", "/api/holds"),
            keyed("POST", "/api/purchases"),
            keyed("PUT", "/api/holds/1"),
            keyed("POST", "/api/holds"),
        ] {
            cache
                .run(&caller, target, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    ApiResponse::ok(&"done")
                })
                .await
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        let caller = ctx("buyer@example.com");

        let failed = cache
            .run(&caller, key(), || async { Err(AppError::unavailable("busy")) })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let retried = cache
            .run(&caller, key(), || async { ApiResponse::ok(&"done") })
            .await;
        assert!(retried.is_ok());
        assert_eq!(cache.len(), 1);
    }
}
