use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::telemetry::AUDIT_TARGET;

use super::attendance::{
    AttendancePatch, AttendanceRecord, AttendanceStatus, AttendanceStore, AttendanceStoreError,
    NewAttendanceRecord,
};
use super::devices::{DeviceError, DeviceTrustTracker};
use super::domain::{
    EmployeeId, EventId, EventType, OrgId, OrgPolicy, PendingAction, RecordId, TrustDecision,
    TrustEvent, TrustSignals, TrustedDevice, Viewer,
};
use super::evaluation::{assess_capture, CaptureAssessment, CaptureGate, TrustEngineConfig};
use super::geo::GeoRiskEvaluator;
use super::ledger::{HeldActionLedger, LedgerError, ReviewDecision};
use super::locks::SerialLocks;
use super::policy::{PolicyError, PolicyUpdate, PolicyViolation, TrustPolicyStore};
use super::repository::{RepositoryError, TrustEventFilter, TrustRepository};
use super::review::{ReviewError, ReviewWorkflow, ScopeResolver};

/// Reason prefix on events whose approved write the attendance store refused.
pub const WRITE_FAILED_PREFIX: &str = "ATTENDANCE_WRITE_FAILED";

/// Administrator-entered punch for an employee. Scored and logged, never blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntryRequest {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub clock_in: DateTime<Utc>,
    #[serde(default)]
    pub clock_out: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
    #[serde(default)]
    pub signals: TrustSignals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub note: Option<String>,
}

/// Committed capture: the record written and the audit event that vouches for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureReceipt {
    pub record_id: RecordId,
    pub assessment: CaptureAssessment,
    pub event: TrustEvent,
}

/// Borrowed context of a capture being settled.
struct Capture<'a> {
    org_id: &'a OrgId,
    employee_id: &'a EmployeeId,
    signals: &'a TrustSignals,
    assessment: CaptureAssessment,
    captured_at: DateTime<Utc>,
}

/// Service composing policy resolution, device trust, geo risk, scoring, the ledger,
/// and held-event review.
pub struct AttendanceTrustService<R, A, O> {
    attendance: Arc<A>,
    policies: TrustPolicyStore<R>,
    devices: DeviceTrustTracker<R>,
    geo: GeoRiskEvaluator<R>,
    ledger: Arc<HeldActionLedger<R, A>>,
    review: ReviewWorkflow<R, A, O>,
    late_after: NaiveTime,
    locks: SerialLocks,
}

fn capture_key(employee_id: &EmployeeId, date: NaiveDate) -> String {
    format!("capture:{employee_id}:{date}")
}

fn review_key(event_id: &EventId) -> String {
    format!("review:{event_id}")
}

impl<R, A, O> AttendanceTrustService<R, A, O>
where
    R: TrustRepository + 'static,
    A: AttendanceStore + 'static,
    O: ScopeResolver + 'static,
{
    pub fn new(
        repository: Arc<R>,
        attendance: Arc<A>,
        scopes: Arc<O>,
        config: TrustEngineConfig,
    ) -> Self {
        let ledger = Arc::new(HeldActionLedger::new(
            repository.clone(),
            attendance.clone(),
        ));
        let review = ReviewWorkflow::new(ledger.clone(), repository.clone(), scopes);

        Self {
            attendance,
            policies: TrustPolicyStore::new(repository.clone(), config.default_policy),
            devices: DeviceTrustTracker::new(repository.clone()),
            geo: GeoRiskEvaluator::new(repository),
            ledger,
            review,
            late_after: config.late_after,
            locks: SerialLocks::default(),
        }
    }

    /// Score and decide a capture without writing anything.
    pub fn evaluate_capture(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        event_type: EventType,
        signals: TrustSignals,
        enforce: bool,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureAssessment, TrustServiceError> {
        let signals = signals.normalized();
        let mut assessment = self.assess(
            org_id,
            employee_id,
            event_type,
            &signals,
            enforce,
            captured_at,
        )?;
        if assessment.decision == TrustDecision::Held {
            assessment.pending_action =
                self.deferred_write(employee_id, event_type, captured_at)?;
        }
        Ok(assessment)
    }

    /// Dry-run evaluation on behalf of a viewer. Anyone may evaluate their own
    /// captures; evaluating someone else needs review rights over that employee.
    pub fn evaluate_as(
        &self,
        viewer: &Viewer,
        employee_id: Option<EmployeeId>,
        event_type: EventType,
        signals: TrustSignals,
        enforce: bool,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureAssessment, TrustServiceError> {
        let employee_id = match employee_id {
            Some(employee_id) => employee_id,
            None => punching_employee(viewer)?,
        };

        if viewer.employee_id.as_ref() != Some(&employee_id)
            && !self.review.scope_for(viewer)?.contains(&employee_id)
        {
            return Err(TrustServiceError::Unauthorized(format!(
                "employee {employee_id} is outside the viewer's review scope"
            )));
        }

        self.evaluate_capture(
            &viewer.org_id,
            &employee_id,
            event_type,
            signals,
            enforce,
            captured_at,
        )
    }

    /// Open today's record for the calling employee, subject to the trust policy.
    pub fn clock_in(
        &self,
        viewer: &Viewer,
        signals: TrustSignals,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureReceipt, TrustServiceError> {
        let employee_id = punching_employee(viewer)?;
        let date = captured_at.date_naive();
        let _guard = self.locks.hold(capture_key(&employee_id, date));

        if self
            .attendance
            .find_by_employee_date(&employee_id, date)?
            .is_some()
        {
            return Err(TrustServiceError::DuplicatePunch);
        }

        let signals = signals.normalized();
        let assessment = self.assess(
            &viewer.org_id,
            &employee_id,
            EventType::ClockIn,
            &signals,
            true,
            captured_at,
        )?;
        let status = AttendanceStatus::for_clock_in(captured_at, self.late_after);

        let capture = Capture {
            org_id: &viewer.org_id,
            employee_id: &employee_id,
            signals: &signals,
            assessment,
            captured_at,
        };
        let deferred = PendingAction::ClockIn {
            date,
            timestamp: captured_at,
            status,
        };

        self.settle(capture, deferred, || {
            Ok(self.attendance.create(NewAttendanceRecord {
                org_id: viewer.org_id.clone(),
                employee_id: employee_id.clone(),
                date,
                clock_in: captured_at,
                clock_out: None,
                status,
            })?)
        })
    }

    /// Close today's open record for the calling employee, subject to the trust policy.
    pub fn clock_out(
        &self,
        viewer: &Viewer,
        signals: TrustSignals,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureReceipt, TrustServiceError> {
        let employee_id = punching_employee(viewer)?;
        let date = captured_at.date_naive();
        let _guard = self.locks.hold(capture_key(&employee_id, date));

        let record = self
            .attendance
            .find_by_employee_date(&employee_id, date)?
            .filter(AttendanceRecord::is_open)
            .ok_or(TrustServiceError::NoOpenPunch)?;

        let signals = signals.normalized();
        let assessment = self.assess(
            &viewer.org_id,
            &employee_id,
            EventType::ClockOut,
            &signals,
            true,
            captured_at,
        )?;

        let capture = Capture {
            org_id: &viewer.org_id,
            employee_id: &employee_id,
            signals: &signals,
            assessment,
            captured_at,
        };
        let deferred = PendingAction::ClockOut {
            record_id: record.id.clone(),
            timestamp: captured_at,
        };

        self.settle(capture, deferred, || {
            self.attendance
                .patch(&record.id, AttendancePatch::clock_out(&record, captured_at))?;
            Ok(record.id.clone())
        })
    }

    /// Record a punch on an employee's behalf. Evaluated with enforcement off.
    pub fn manual_entry(
        &self,
        viewer: &Viewer,
        entry: ManualEntryRequest,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureReceipt, TrustServiceError> {
        if !viewer.role.can_enter_manual_punches() {
            return Err(TrustServiceError::Unauthorized(format!(
                "role {} cannot enter manual punches",
                viewer.role.label()
            )));
        }

        let ManualEntryRequest {
            employee_id,
            date,
            clock_in,
            clock_out,
            status,
            signals,
        } = entry;

        let _guard = self.locks.hold(capture_key(&employee_id, date));

        if self
            .attendance
            .find_by_employee_date(&employee_id, date)?
            .is_some()
        {
            return Err(TrustServiceError::DuplicatePunch);
        }

        let signals = signals.normalized();
        let assessment = self.assess(
            &viewer.org_id,
            &employee_id,
            EventType::ManualEntry,
            &signals,
            false,
            captured_at,
        )?;
        let status =
            status.unwrap_or_else(|| AttendanceStatus::for_clock_in(clock_in, self.late_after));

        let capture = Capture {
            org_id: &viewer.org_id,
            employee_id: &employee_id,
            signals: &signals,
            assessment,
            captured_at,
        };
        let deferred = PendingAction::ClockIn {
            date,
            timestamp: clock_in,
            status,
        };

        self.settle(capture, deferred, || {
            Ok(self.attendance.create(NewAttendanceRecord {
                org_id: viewer.org_id.clone(),
                employee_id: employee_id.clone(),
                date,
                clock_in,
                clock_out,
                status,
            })?)
        })
    }

    pub fn get_policy(
        &self,
        viewer: &Viewer,
        org_id: &OrgId,
    ) -> Result<OrgPolicy, TrustServiceError> {
        if &viewer.org_id != org_id {
            return Err(TrustServiceError::Unauthorized(
                "policy belongs to another organization".to_string(),
            ));
        }
        Ok(self.policies.get(org_id)?)
    }

    pub fn upsert_policy(
        &self,
        viewer: &Viewer,
        org_id: &OrgId,
        update: PolicyUpdate,
        at: DateTime<Utc>,
    ) -> Result<OrgPolicy, TrustServiceError> {
        Ok(self.policies.upsert(viewer, org_id, update, at)?)
    }

    pub fn list_trust_events(
        &self,
        viewer: &Viewer,
        filter: TrustEventFilter,
    ) -> Result<Vec<TrustEvent>, TrustServiceError> {
        Ok(self.review.list_events(viewer, filter)?)
    }

    pub fn list_held_events(
        &self,
        viewer: &Viewer,
        limit: Option<usize>,
    ) -> Result<Vec<TrustEvent>, TrustServiceError> {
        Ok(self.review.list_held(viewer, limit)?)
    }

    /// Approve or reject a held event. Serialized per event, and per employee-day while
    /// the deferred write replays.
    pub fn review_held_event(
        &self,
        viewer: &Viewer,
        event_id: &EventId,
        request: ReviewRequest,
        at: DateTime<Utc>,
    ) -> Result<TrustEvent, TrustServiceError> {
        let _review_guard = self.locks.hold(review_key(event_id));

        let event = self.ledger.fetch(&viewer.org_id, event_id)?;
        let _capture_guard = self.locks.hold(capture_key(
            &event.employee_id,
            event.captured_at.date_naive(),
        ));

        Ok(self
            .review
            .review(viewer, event_id, request.decision, request.note, at)?)
    }

    pub fn revoke_device(
        &self,
        viewer: &Viewer,
        employee_id: &EmployeeId,
        device_hash: &str,
    ) -> Result<TrustedDevice, TrustServiceError> {
        Ok(self.devices.revoke(viewer, employee_id, device_hash)?)
    }

    #[cfg(test)]
    pub(crate) fn held_lock_count(&self) -> usize {
        self.locks.held_keys()
    }

    fn assess(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        event_type: EventType,
        signals: &TrustSignals,
        enforce: bool,
        captured_at: DateTime<Utc>,
    ) -> Result<CaptureAssessment, TrustServiceError> {
        let policy = self.policies.resolve(org_id)?;
        let known_device = self
            .devices
            .is_trusted(employee_id, signals.device_hash.as_deref())?;
        let geo = self
            .geo
            .evaluate(org_id, employee_id, signals, &policy, captured_at)?;

        Ok(assess_capture(
            &policy,
            event_type,
            signals,
            known_device,
            geo,
            enforce,
        ))
    }

    /// Apply the gate: commit and learn the device, or log and refuse.
    fn settle<F>(
        &self,
        capture: Capture<'_>,
        deferred: PendingAction,
        commit: F,
    ) -> Result<CaptureReceipt, TrustServiceError>
    where
        F: FnOnce() -> Result<RecordId, TrustServiceError>,
    {
        match capture.assessment.gate() {
            CaptureGate::ReasonRequired => {
                let event = self.record(&capture, None, None)?;
                warn!(
                    target: AUDIT_TARGET,
                    event_id = %event.id,
                    employee_id = %capture.employee_id,
                    risk_score = event.risk_score,
                    "attendance punch rejected: reason required"
                );
                Err(TrustServiceError::ReasonRequired { event_id: event.id })
            }
            CaptureGate::Hold => {
                let event = self.record(&capture, None, Some(deferred))?;
                warn!(
                    target: AUDIT_TARGET,
                    event_id = %event.id,
                    employee_id = %capture.employee_id,
                    risk_score = event.risk_score,
                    "attendance punch held for review"
                );
                Err(TrustServiceError::PunchHeld { event_id: event.id })
            }
            CaptureGate::Deny => {
                let event = self.record(&capture, None, None)?;
                warn!(
                    target: AUDIT_TARGET,
                    event_id = %event.id,
                    employee_id = %capture.employee_id,
                    risk_score = event.risk_score,
                    "attendance punch denied"
                );
                Err(TrustServiceError::PunchDenied { event_id: event.id })
            }
            CaptureGate::Proceed => {
                let record_id = match commit() {
                    Ok(record_id) => record_id,
                    Err(err) => return Err(self.record_failed_write(&capture, err)),
                };
                let event = self.record(&capture, Some(record_id.clone()), None)?;
                if capture.assessment.event_type != EventType::ManualEntry {
                    if let Err(err) = self.devices.record_seen(
                        capture.org_id,
                        capture.employee_id,
                        capture.signals.device_hash.as_deref(),
                        capture.captured_at,
                    ) {
                        // Punch is already committed and audited.
                        warn!(
                            event_id = %event.id,
                            employee_id = %capture.employee_id,
                            error = %err,
                            "trusted device could not be updated"
                        );
                    }
                }
                info!(
                    target: AUDIT_TARGET,
                    event_id = %event.id,
                    record_id = %record_id,
                    employee_id = %capture.employee_id,
                    event_type = event.event_type.label(),
                    decision = event.decision.label(),
                    risk_score = event.risk_score,
                    "attendance punch recorded"
                );
                Ok(CaptureReceipt {
                    record_id,
                    assessment: capture.assessment,
                    event,
                })
            }
        }
    }

    /// Log a capture the policy let through but the attendance store refused, then
    /// hand the store's error back to the caller.
    fn deferred_write(
        &self,
        employee_id: &EmployeeId,
        event_type: EventType,
        captured_at: DateTime<Utc>,
    ) -> Result<Option<PendingAction>, TrustServiceError> {
        let date = captured_at.date_naive();
        let action = match event_type {
            EventType::ClockIn => Some(PendingAction::ClockIn {
                date,
                timestamp: captured_at,
                status: AttendanceStatus::for_clock_in(captured_at, self.late_after),
            }),
            EventType::ClockOut => self
                .attendance
                .find_by_employee_date(employee_id, date)?
                .filter(AttendanceRecord::is_open)
                .map(|record| PendingAction::ClockOut {
                    record_id: record.id,
                    timestamp: captured_at,
                }),
            EventType::ManualEntry => None,
        };
        Ok(action)
    }

    fn record_failed_write(
        &self,
        capture: &Capture<'_>,
        err: TrustServiceError,
    ) -> TrustServiceError {
        let mut event = trust_event(capture, None, None);
        event.decision = TrustDecision::Denied;
        event
            .reasons
            .push(format!("{WRITE_FAILED_PREFIX}:{}", err.code()));

        match self.ledger.append(event) {
            Ok(event) => warn!(
                target: AUDIT_TARGET,
                event_id = %event.id,
                employee_id = %capture.employee_id,
                error = %err,
                "attendance punch refused by attendance store"
            ),
            Err(ledger_err) => warn!(
                target: AUDIT_TARGET,
                employee_id = %capture.employee_id,
                error = %err,
                ledger_error = %ledger_err,
                "attendance punch refused and could not be logged"
            ),
        }
        err
    }

    fn record(
        &self,
        capture: &Capture<'_>,
        record_id: Option<RecordId>,
        pending_action: Option<PendingAction>,
    ) -> Result<TrustEvent, TrustServiceError> {
        Ok(self
            .ledger
            .append(trust_event(capture, record_id, pending_action))?)
    }
}

fn trust_event(
    capture: &Capture<'_>,
    record_id: Option<RecordId>,
    pending_action: Option<PendingAction>,
) -> TrustEvent {
    let assessment = &capture.assessment;
    TrustEvent {
        id: EventId(String::new()),
        org_id: capture.org_id.clone(),
        employee_id: capture.employee_id.clone(),
        attendance_record_id: record_id,
        event_type: assessment.event_type,
        captured_at: capture.captured_at,
        risk_score: assessment.risk_score,
        risk_level: assessment.risk_level,
        policy_mode: assessment.policy_mode,
        decision: assessment.decision,
        reason_required: assessment.requires_reason,
        reasons: assessment.reasons.clone(),
        signals: capture.signals.redacted(),
        review_note: None,
        pending_action,
        reviewed_by: None,
        reviewed_at: None,
    }
}

fn punching_employee(viewer: &Viewer) -> Result<EmployeeId, TrustServiceError> {
    viewer.employee_id.clone().ok_or_else(|| {
        TrustServiceError::Unauthorized("viewer is not linked to an employee".to_string())
    })
}

/// Error raised by the attendance trust service.
#[derive(Debug, thiserror::Error)]
pub enum TrustServiceError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid policy: {0}")]
    InvalidPolicy(PolicyViolation),
    #[error("a reason is required for this punch (event {event_id})")]
    ReasonRequired { event_id: EventId },
    #[error("punch held for supervisor review (event {event_id})")]
    PunchHeld { event_id: EventId },
    #[error("punch denied by attendance trust policy (event {event_id})")]
    PunchDenied { event_id: EventId },
    #[error("employee already clocked in for this date")]
    DuplicatePunch,
    #[error("no open punch to clock out of")]
    NoOpenPunch,
    #[error("trust event is not pending review")]
    NotPending,
    #[error("not found")]
    NotFound,
    #[error("held action references an attendance record that no longer matches")]
    StaleReference,
    #[error(transparent)]
    Ledger(LedgerError),
    #[error(transparent)]
    Attendance(AttendanceStoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TrustServiceError {
    /// Stable snake_case code carried in error bodies and failed-write reasons.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::ReasonRequired { .. } => "reason_required",
            Self::PunchHeld { .. } => "punch_held",
            Self::PunchDenied { .. } => "punch_denied",
            Self::DuplicatePunch => "duplicate_punch",
            Self::NoOpenPunch => "no_open_punch",
            Self::NotPending => "not_pending",
            Self::NotFound => "not_found",
            Self::StaleReference => "stale_reference",
            Self::Ledger(_) | Self::Attendance(_) | Self::Repository(_) => "internal",
        }
    }
}

impl From<AttendanceStoreError> for TrustServiceError {
    fn from(value: AttendanceStoreError) -> Self {
        match value {
            AttendanceStoreError::DuplicatePunch => Self::DuplicatePunch,
            AttendanceStoreError::NoOpenPunch => Self::NoOpenPunch,
            other => Self::Attendance(other),
        }
    }
}

impl From<LedgerError> for TrustServiceError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound => Self::NotFound,
            LedgerError::NotPending { .. } => Self::NotPending,
            LedgerError::StaleReference => Self::StaleReference,
            LedgerError::Repository(err) => Self::Repository(err),
            LedgerError::Attendance(err) => err.into(),
            other @ LedgerError::PendingActionMismatch { .. } => Self::Ledger(other),
        }
    }
}

impl From<PolicyError> for TrustServiceError {
    fn from(value: PolicyError) -> Self {
        match value {
            PolicyError::Unauthorized(message) => Self::Unauthorized(message),
            PolicyError::Invalid(violation) => Self::InvalidPolicy(violation),
            PolicyError::Repository(err) => Self::Repository(err),
        }
    }
}

impl From<ReviewError> for TrustServiceError {
    fn from(value: ReviewError) -> Self {
        match value {
            ReviewError::Unauthorized(message) => Self::Unauthorized(message),
            ReviewError::Ledger(err) => err.into(),
            ReviewError::Repository(err) => Self::Repository(err),
        }
    }
}

impl From<DeviceError> for TrustServiceError {
    fn from(value: DeviceError) -> Self {
        match value {
            DeviceError::Unauthorized(message) => Self::Unauthorized(message),
            DeviceError::NotFound => Self::NotFound,
            DeviceError::Repository(err) => Self::Repository(err),
        }
    }
}
