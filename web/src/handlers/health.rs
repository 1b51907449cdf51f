//! Health check endpoints.
//!
//! Used by load balancers and monitoring to verify the service is up.

use axum::{Json, http::StatusCode};
use boxoffice_core::reducer::Reducer;
use boxoffice_runtime::{HealthCheck, HealthStatus, Store};

/// Liveness probe. Does not look at any dependency.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report for a store.
///
/// - 200 OK: healthy or degraded
/// - 503 Service Unavailable: unhealthy (full dead letter queue, shutting down)
pub fn store_readiness<S, A, E, R>(store: &Store<S, A, E, R>) -> (StatusCode, Json<HealthCheck>)
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    S: Send + Sync + 'static,
    A: Send + Clone + 'static,
    E: Send + Sync + 'static,
{
    let health = store.health();

    let status = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::{SmallVec, effect::Effect};
    use std::time::Duration;

    #[derive(Clone)]
    struct NoopReducer;

    impl Reducer for NoopReducer {
        type State = ();
        type Action = ();
        type Environment = ();

        fn reduce(
            &self,
            _state: &mut Self::State,
            _action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            SmallVec::new()
        }
    }

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn healthy_store_is_ready() {
        let store = Store::new((), NoopReducer, ());

        let (status, Json(health)) = store_readiness(&store);

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn shutting_down_store_is_not_ready() {
        let store = Store::new((), NoopReducer, ());
        let _ = store.shutdown(Duration::from_millis(100)).await;

        let (status, _) = store_readiness(&store);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
