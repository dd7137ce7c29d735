use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAttendanceStore, InMemoryOrgChart, InMemoryTrustRepository};
use crate::routes::with_trust_routes;
use attendance_trust::config::AppConfig;
use attendance_trust::error::AppError;
use attendance_trust::telemetry;
use attendance_trust::workflows::attendance::trust::AttendanceTrustService;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(mode) = args.trust_mode.take() {
        config.trust.default_policy.mode = mode;
    }
    if let Some(cutoff) = args.late_after.take() {
        config.trust.late_after = cutoff;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let org_chart = match args.org_chart.take() {
        Some(path) => InMemoryOrgChart::load(&path)?,
        None => InMemoryOrgChart::default(),
    };

    let trust_service = Arc::new(AttendanceTrustService::new(
        Arc::new(InMemoryTrustRepository::default()),
        Arc::new(InMemoryAttendanceStore::default()),
        Arc::new(org_chart),
        config.trust.clone(),
    ));

    let app = with_trust_routes(trust_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        default_mode = config.trust.default_policy.mode.label(),
        "attendance trust service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
