//! Contract of the external attendance-record store the engine writes through.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EmployeeId, OrgId, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    /// Status of a clock-in captured at `at`, given the day's late cut-off (UTC).
    pub fn for_clock_in(at: DateTime<Utc>, late_after: NaiveTime) -> Self {
        if at.time() > late_after {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
        }
    }
}

/// Daily punch record as exposed by the attendance store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub org_id: OrgId,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub work_minutes: Option<i64>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }
}

/// Fields for a record the store has not seen yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendanceRecord {
    pub org_id: OrgId,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
}

impl NewAttendanceRecord {
    pub fn work_minutes(&self) -> Option<i64> {
        self.clock_out
            .map(|clock_out| work_minutes(self.clock_in, clock_out))
    }
}

/// Partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePatch {
    pub clock_out: Option<DateTime<Utc>>,
    pub work_minutes: Option<i64>,
}

impl AttendancePatch {
    /// Completes a record: clock-out plus the derived work duration.
    pub fn clock_out(record: &AttendanceRecord, at: DateTime<Utc>) -> Self {
        Self {
            clock_out: Some(at),
            work_minutes: Some(work_minutes(record.clock_in, at)),
        }
    }
}

/// Whole minutes worked between two punches, never negative.
pub fn work_minutes(clock_in: DateTime<Utc>, clock_out: DateTime<Utc>) -> i64 {
    (clock_out - clock_in).num_minutes().max(0)
}

/// Narrow interface onto the attendance-record store.
pub trait AttendanceStore: Send + Sync {
    fn find_by_employee_date(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceStoreError>;
    /// Create a daily record. Fails with `DuplicatePunch` when one already exists for the day.
    fn create(&self, record: NewAttendanceRecord) -> Result<RecordId, AttendanceStoreError>;
    fn patch(&self, id: &RecordId, patch: AttendancePatch) -> Result<(), AttendanceStoreError>;
    fn get(&self, id: &RecordId) -> Result<Option<AttendanceRecord>, AttendanceStoreError>;
}

/// Domain invariant violations and transport failures raised by the attendance store.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceStoreError {
    #[error("employee already clocked in for this date")]
    DuplicatePunch,
    #[error("no open punch to clock out of")]
    NoOpenPunch,
    #[error("attendance record not found")]
    NotFound,
    #[error("attendance store unavailable: {0}")]
    Unavailable(String),
}
