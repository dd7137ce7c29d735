//! Attendance trust: per-punch risk scoring, policy decisions, and held-punch review.
//!
//! Every clock-in, clock-out, and manual entry is scored from device, network, and
//! location signals, decided against the organization's policy, and written to an
//! audit ledger. Held punches carry their deferred write and replay it exactly once
//! when a reviewer approves.

pub mod attendance;
pub mod devices;
pub mod domain;
pub mod evaluation;
pub mod geo;
pub mod ledger;
mod locks;
pub mod policy;
pub mod repository;
pub mod review;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use attendance::{
    AttendancePatch, AttendanceRecord, AttendanceStatus, AttendanceStore, AttendanceStoreError,
    NewAttendanceRecord,
};
pub use devices::{DeviceError, DeviceTrustTracker};
pub use domain::{
    DeviceStatus, EmployeeId, EventId, EventType, Geofence, OrgId, OrgPolicy, PendingAction,
    PolicyMode, ReasonRiskLevel, RecordId, RiskLevel, TrustDecision, TrustEvent, TrustPolicy,
    TrustSignals, TrustedDevice, UnknownSetting, UserId, Viewer, ViewerRole,
};
pub use evaluation::{assess_capture, CaptureAssessment, CaptureGate, TrustEngineConfig};
pub use geo::{distance_meters, GeoPoint, GeoRisk, GeoRiskEvaluator};
pub use ledger::{HeldActionLedger, LedgerError, ReviewDecision};
pub use policy::{validate_policy, PolicyError, PolicyUpdate, PolicyViolation, TrustPolicyStore};
pub use repository::{
    DeviceRepository, PolicyRepository, RepositoryError, TrustEventFilter, TrustEventQuery,
    TrustEventRepository, TrustRepository,
};
pub use review::{ReviewError, ReviewScope, ReviewWorkflow, ScopeResolver};
pub use router::attendance_trust_router;
pub use service::{
    AttendanceTrustService, CaptureReceipt, ManualEntryRequest, ReviewRequest, TrustServiceError,
    WRITE_FAILED_PREFIX,
};
