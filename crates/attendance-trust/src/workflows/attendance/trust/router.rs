use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::attendance::AttendanceStore;
use super::domain::{
    EmployeeId, EventId, EventType, OrgId, TrustSignals, UserId, Viewer, ViewerRole,
};
use super::policy::PolicyUpdate;
use super::repository::{TrustEventFilter, TrustRepository};
use super::review::ScopeResolver;
use super::service::{
    AttendanceTrustService, ManualEntryRequest, ReviewRequest, TrustServiceError,
};

pub const USER_HEADER: &str = "x-user-id";
pub const ORG_HEADER: &str = "x-org-id";
pub const EMPLOYEE_HEADER: &str = "x-employee-id";
pub const ROLE_HEADER: &str = "x-viewer-role";

type SharedService<R, A, O> = Arc<AttendanceTrustService<R, A, O>>;

/// Router builder exposing punch capture, policy administration, and held-event review.
pub fn attendance_trust_router<R, A, O>(service: SharedService<R, A, O>) -> Router
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    Router::new()
        .route(
            "/api/v1/attendance/clock-in",
            post(clock_in_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/clock-out",
            post(clock_out_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/manual-entries",
            post(manual_entry_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/trust/evaluate",
            post(evaluate_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/trust/policy",
            get(get_policy_handler::<R, A, O>).put(upsert_policy_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/trust/events",
            get(list_events_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/trust/held",
            get(list_held_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/trust/held/:event_id/review",
            post(review_handler::<R, A, O>),
        )
        .route(
            "/api/v1/attendance/trust/devices/revoke",
            post(revoke_device_handler::<R, A, O>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CaptureRequest {
    #[serde(default)]
    pub(crate) signals: TrustSignals,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateRequest {
    #[serde(default)]
    pub(crate) employee_id: Option<EmployeeId>,
    pub(crate) event_type: EventType,
    #[serde(default)]
    pub(crate) signals: TrustSignals,
    #[serde(default = "enforce_by_default")]
    pub(crate) enforce: bool,
    #[serde(default)]
    pub(crate) captured_at: Option<DateTime<Utc>>,
}

fn enforce_by_default() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HeldQuery {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevokeDeviceRequest {
    pub(crate) employee_id: EmployeeId,
    pub(crate) device_hash: String,
}

/// Resolve the caller from identity headers set by the upstream auth layer.
pub(crate) fn viewer_from_headers(headers: &HeaderMap) -> Result<Viewer, Response> {
    let read = |name: &'static str| -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let user_id = read(USER_HEADER).ok_or_else(|| missing_identity(USER_HEADER))?;
    let org_id = read(ORG_HEADER).ok_or_else(|| missing_identity(ORG_HEADER))?;
    let role = read(ROLE_HEADER)
        .as_deref()
        .and_then(ViewerRole::parse)
        .ok_or_else(|| missing_identity(ROLE_HEADER))?;

    Ok(Viewer {
        user_id: UserId(user_id),
        org_id: OrgId(org_id),
        employee_id: read(EMPLOYEE_HEADER).map(EmployeeId),
        role,
    })
}

fn missing_identity(header: &str) -> Response {
    let payload = json!({
        "error": format!("missing or invalid identity header {header}"),
        "code": "unauthenticated",
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

pub(crate) fn error_status(error: &TrustServiceError) -> StatusCode {
    match error {
        TrustServiceError::Unauthorized(_) | TrustServiceError::PunchDenied { .. } => {
            StatusCode::FORBIDDEN
        }
        TrustServiceError::InvalidPolicy(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TrustServiceError::ReasonRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
        TrustServiceError::PunchHeld { .. } => StatusCode::ACCEPTED,
        TrustServiceError::DuplicatePunch
        | TrustServiceError::NoOpenPunch
        | TrustServiceError::NotPending
        | TrustServiceError::StaleReference => StatusCode::CONFLICT,
        TrustServiceError::NotFound => StatusCode::NOT_FOUND,
        TrustServiceError::Ledger(_)
        | TrustServiceError::Attendance(_)
        | TrustServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: TrustServiceError) -> Response {
    let status = error_status(&error);
    let mut payload = json!({
        "error": error.to_string(),
        "code": error.code(),
    });

    let event_id = match &error {
        TrustServiceError::ReasonRequired { event_id }
        | TrustServiceError::PunchHeld { event_id }
        | TrustServiceError::PunchDenied { event_id } => Some(event_id.0.clone()),
        _ => None,
    };
    if let Some(event_id) = event_id {
        payload["event_id"] = json!(event_id);
    }

    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, TrustServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn clock_in_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Json(request): Json<CaptureRequest>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.clock_in(&viewer, request.signals, Utc::now()),
    )
}

pub(crate) async fn clock_out_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Json(request): Json<CaptureRequest>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.clock_out(&viewer, request.signals, Utc::now()),
    )
}

pub(crate) async fn manual_entry_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Json(entry): Json<ManualEntryRequest>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.manual_entry(&viewer, entry, Utc::now()),
    )
}

pub(crate) async fn evaluate_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Json(request): Json<EvaluateRequest>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    respond(
        StatusCode::OK,
        service.evaluate_as(
            &viewer,
            request.employee_id,
            request.event_type,
            request.signals,
            request.enforce,
            request.captured_at.unwrap_or_else(Utc::now),
        ),
    )
}

pub(crate) async fn get_policy_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.get_policy(&viewer, &viewer.org_id))
}

pub(crate) async fn upsert_policy_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Json(update): Json<PolicyUpdate>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.upsert_policy(&viewer, &viewer.org_id, update, Utc::now()),
    )
}

pub(crate) async fn list_events_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Query(filter): Query<TrustEventFilter>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.list_trust_events(&viewer, filter))
}

pub(crate) async fn list_held_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Query(query): Query<HeldQuery>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.list_held_events(&viewer, query.limit),
    )
}

pub(crate) async fn review_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.review_held_event(&viewer, &EventId(event_id), request, Utc::now()),
    )
}

pub(crate) async fn revoke_device_handler<R, A, O>(
    State(service): State<SharedService<R, A, O>>,
    headers: HeaderMap,
    Json(request): Json<RevokeDeviceRequest>,
) -> Response
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    let viewer = match viewer_from_headers(&headers) {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.revoke_device(&viewer, &request.employee_id, &request.device_hash),
    )
}
