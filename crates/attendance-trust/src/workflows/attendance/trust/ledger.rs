use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::telemetry::AUDIT_TARGET;

use super::attendance::{
    AttendancePatch, AttendanceStore, AttendanceStoreError, NewAttendanceRecord,
};
use super::domain::{
    EventId, OrgId, PendingAction, RecordId, TrustDecision, TrustEvent, UserId, MAX_REASON_CHARS,
};
use super::repository::{RepositoryError, TrustEventRepository};

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> EventId {
    let id = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EventId(format!("tev-{id:06}"))
}

/// Reviewer verdict on a held event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl From<ReviewDecision> for TrustDecision {
    fn from(value: ReviewDecision) -> Self {
        match value {
            ReviewDecision::Approved => TrustDecision::Approved,
            ReviewDecision::Rejected => TrustDecision::Rejected,
        }
    }
}

/// Audit log of every evaluated capture, plus exactly-once replay of held writes.
pub struct HeldActionLedger<E: ?Sized, A: ?Sized> {
    events: Arc<E>,
    attendance: Arc<A>,
}

impl<E, A> HeldActionLedger<E, A>
where
    E: TrustEventRepository + ?Sized,
    A: AttendanceStore + ?Sized,
{
    pub fn new(events: Arc<E>, attendance: Arc<A>) -> Self {
        Self { events, attendance }
    }

    /// Persist an evaluated capture under a freshly assigned id.
    ///
    /// A pending action must be present exactly when the decision is `Held`.
    pub fn append(&self, mut event: TrustEvent) -> Result<TrustEvent, LedgerError> {
        if event.is_pending() != event.pending_action.is_some() {
            return Err(LedgerError::PendingActionMismatch {
                decision: event.decision,
            });
        }

        event.id = next_event_id();
        Ok(self.events.insert_event(event)?)
    }

    /// Fetch an event, hiding events that belong to another organization.
    pub fn fetch(&self, org_id: &OrgId, event_id: &EventId) -> Result<TrustEvent, LedgerError> {
        self.events
            .fetch_event(event_id)?
            .filter(|event| &event.org_id == org_id)
            .ok_or(LedgerError::NotFound)
    }

    /// Settle a held event. Approval replays the deferred write before the event is stamped.
    pub fn resolve(
        &self,
        org_id: &OrgId,
        event_id: &EventId,
        decision: ReviewDecision,
        reviewer: &UserId,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TrustEvent, LedgerError> {
        let mut event = self.fetch(org_id, event_id)?;
        if !event.is_pending() {
            return Err(LedgerError::NotPending {
                decision: event.decision,
            });
        }

        let action = event
            .pending_action
            .take()
            .ok_or(LedgerError::PendingActionMismatch {
                decision: event.decision,
            })?;

        if decision == ReviewDecision::Approved {
            let record_id = self.replay(&event, &action)?;
            event.attendance_record_id = Some(record_id);
        }

        event.decision = decision.into();
        event.reviewed_by = Some(reviewer.clone());
        event.reviewed_at = Some(at);
        event.review_note = note
            .map(|text| text.trim().chars().take(MAX_REASON_CHARS).collect::<String>())
            .filter(|text| !text.is_empty());

        self.events.update_event(event.clone())?;

        info!(
            target: AUDIT_TARGET,
            event_id = %event.id,
            employee_id = %event.employee_id,
            decision = event.decision.label(),
            reviewer = %reviewer,
            "held attendance event resolved"
        );

        Ok(event)
    }

    /// Perform the write a held capture deferred. Safe to run against a store that
    /// already reflects the write.
    fn replay(&self, event: &TrustEvent, action: &PendingAction) -> Result<RecordId, LedgerError> {
        match action {
            PendingAction::ClockIn {
                date,
                timestamp,
                status,
            } => {
                if let Some(existing) = self
                    .attendance
                    .find_by_employee_date(&event.employee_id, *date)?
                {
                    return Ok(existing.id);
                }

                let created = self.attendance.create(NewAttendanceRecord {
                    org_id: event.org_id.clone(),
                    employee_id: event.employee_id.clone(),
                    date: *date,
                    clock_in: *timestamp,
                    clock_out: None,
                    status: *status,
                });

                match created {
                    Ok(record_id) => Ok(record_id),
                    Err(AttendanceStoreError::DuplicatePunch) => self
                        .attendance
                        .find_by_employee_date(&event.employee_id, *date)?
                        .map(|existing| existing.id)
                        .ok_or(LedgerError::StaleReference),
                    Err(other) => Err(other.into()),
                }
            }
            PendingAction::ClockOut {
                record_id,
                timestamp,
            } => {
                let record = self
                    .attendance
                    .get(record_id)?
                    .filter(|record| {
                        record.org_id == event.org_id && record.employee_id == event.employee_id
                    })
                    .ok_or(LedgerError::StaleReference)?;

                if record.is_open() {
                    self.attendance
                        .patch(&record.id, AttendancePatch::clock_out(&record, *timestamp))?;
                }

                Ok(record.id)
            }
        }
    }
}

/// Errors raised while appending or resolving ledger entries.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("trust event not found")]
    NotFound,
    #[error("trust event is not pending review (decision: {})", .decision.label())]
    NotPending { decision: TrustDecision },
    #[error("held action references an attendance record that no longer matches")]
    StaleReference,
    #[error("pending action must accompany exactly the held decision (got {})", .decision.label())]
    PendingActionMismatch { decision: TrustDecision },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Attendance(#[from] AttendanceStoreError),
}
