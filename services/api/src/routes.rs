use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use estate_onboarding::workflows::onboarding::{
    onboarding_router, OnboardingService, SubmissionStore,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_platform_routes<S>(service: Arc<OnboardingService<S>>) -> axum::Router
where
    S: SubmissionStore + 'static,
{
    onboarding_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Acquire);
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "initializing")
    };

    (status, Json(json!({ "status": label })))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{LoggingNotificationSink, SandboxIdentityProvider, StaticTokenAuth};
    use axum::body::Body;
    use axum::http::Request;
    use estate_onboarding::config::{AuthConfig, OnboardingConfig};
    use estate_onboarding::workflows::onboarding::{Collaborators, InMemorySubmissionStore};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app_state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
        }
    }

    fn platform(state: AppState) -> axum::Router {
        let auth = AuthConfig::parse("dev-investor=investor-1").expect("token list");
        let service = Arc::new(OnboardingService::new(
            Arc::new(InMemorySubmissionStore::new()),
            Collaborators {
                identity: Arc::new(SandboxIdentityProvider::default()),
                notifications: Arc::new(LoggingNotificationSink::default()),
                auth: Arc::new(StaticTokenAuth::from_config(&auth)),
            },
            &OnboardingConfig::default(),
        ));
        with_platform_routes(service).layer(Extension(state))
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let response = readiness_endpoint(Extension(app_state(false)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = readiness_endpoint(Extension(app_state(true)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_metrics_sit_beside_onboarding_routes() {
        let app = platform(app_state(true));

        let health = app
            .clone()
            .oneshot(
                Request::get("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("health responds");
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = app
            .clone()
            .oneshot(
                Request::get("/metrics")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("metrics responds");
        assert_eq!(
            metrics.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"text/plain; version=0.0.4"[..])
        );

        let status = app
            .oneshot(
                Request::get("/api/v1/onboarding/status")
                    .header(header::AUTHORIZATION, "Bearer dev-investor")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("status responds");
        assert_eq!(status.status(), StatusCode::OK);
    }
}
