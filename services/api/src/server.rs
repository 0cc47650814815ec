use crate::cli::ServeArgs;
use crate::infra::{AppState, LoggingNotificationSink, SandboxIdentityProvider, StaticTokenAuth};
use crate::routes::with_platform_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use estate_onboarding::config::AppConfig;
use estate_onboarding::error::AppError;
use estate_onboarding::telemetry;
use estate_onboarding::workflows::onboarding::{
    Collaborators, InMemorySubmissionStore, OnboardingService,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let auth = StaticTokenAuth::from_config(&config.auth);
    if auth.is_empty() {
        warn!("APP_AUTH_TOKENS is empty; every onboarding request will be rejected");
    }
    let collaborators = Collaborators {
        identity: Arc::new(SandboxIdentityProvider::default()),
        notifications: Arc::new(LoggingNotificationSink::default()),
        auth: Arc::new(auth),
    };
    let store = Arc::new(InMemorySubmissionStore::new());
    let service = Arc::new(OnboardingService::new(
        store,
        collaborators,
        &config.onboarding,
    ));

    let app = with_platform_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "onboarding service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
