use crate::error::{Error, Result};
use crate::metrics::MetricsRegistry;
use crate::shutdown::ShutdownCoordinator;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for the read-only status surface. It never propagates
/// pipeline errors to its own callers; before the pipeline has started both
/// routes answer 503.
#[derive(Clone)]
pub struct StatusState {
    metrics: Arc<MetricsRegistry>,
    prometheus: PrometheusHandle,
}

impl StatusState {
    pub fn new(metrics: Arc<MetricsRegistry>, prometheus: PrometheusHandle) -> Self {
        Self {
            metrics,
            prometheus,
        }
    }
}

/// Install the process-wide Prometheus recorder. Call once at startup, before
/// the pipeline records anything.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Internal(format!("Failed to install Prometheus recorder: {}", e)))
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/metrics", get(exposition))
        .with_state(state)
}

async fn status(State(state): State<StatusState>) -> Response {
    if !state.metrics.is_started() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "pipeline not started"})),
        )
            .into_response();
    }
    Json(state.metrics.snapshot()).into_response()
}

async fn exposition(State(state): State<StatusState>) -> Response {
    if !state.metrics.is_started() {
        return (StatusCode::SERVICE_UNAVAILABLE, "pipeline not started\n").into_response();
    }
    state.prometheus.render().into_response()
}

/// Serve the surface until the coordinator's stop token is set. The surface
/// stays queryable through draining; it only goes away with the process.
pub async fn serve(
    addr: SocketAddr,
    state: StatusState,
    coordinator: Arc<ShutdownCoordinator>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Status surface listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { coordinator.wait_for_stop().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (Arc<MetricsRegistry>, StatusState) {
        // Tests render against a local recorder handle without installing it
        // globally, so parallel tests do not fight over the process recorder.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics = Arc::new(MetricsRegistry::new());
        (metrics.clone(), StatusState::new(metrics, handle))
    }

    #[tokio::test]
    async fn status_reports_not_ready_before_start() {
        let (_metrics, state) = state();
        let response = router(state)
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_serves_a_snapshot_once_started() {
        let (metrics, state) = state();
        metrics.mark_started();
        metrics.record_success(0.2);

        let response = router(state)
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: crate::metrics::MetricsSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.success_count, 1);
        assert!((snapshot.average_response_time - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn exposition_endpoint_gates_on_start() {
        let (metrics, state) = state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        metrics.mark_started();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn exposition_renders_registry_emissions() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let registry = Arc::new(MetricsRegistry::new());

        // Recordings made through the registry must land in the same
        // recorder the handle renders from; an exporter bound to a different
        // `metrics` facade version would leave this body empty.
        metrics::with_local_recorder(&recorder, || {
            registry.record_success(0.2);
            registry.record_failure();
            registry.record_retry("http://a");
        });
        registry.mark_started();

        let state = StatusState::new(registry, handle);
        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("fetch_success_total"), "missing series: {}", body);
        assert!(body.contains("fetch_failure_total"));
        assert!(body.contains("fetch_retries_total"));
    }
}
