use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::attendance::AttendanceStatus;
use super::geo::GeoPoint;

/// Longest free-text justification kept on a captured punch.
pub const MAX_REASON_CHARS: usize = 500;
/// Longest reason code kept on a captured punch.
pub const MAX_REASON_CODE_CHARS: usize = 120;

/// Decimal places kept on stored coordinates (about one meter).
const STORED_COORDINATE_SCALE: f64 = 100_000.0;

/// Identifier wrapper for organizations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub String);

/// Identifier wrapper for employees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

/// Identifier wrapper for authenticated users (reviewers, administrators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Identifier wrapper for trust events in the audit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

/// Identifier wrapper for daily attendance records owned by the attendance store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-supplied signals attached to a punch. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustSignals {
    pub device_hash: Option<String>,
    pub network_hash: Option<String>,
    pub user_agent_hash: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy_meters: Option<f64>,
    pub reason_code: Option<String>,
    pub reason: Option<String>,
}

impl TrustSignals {
    /// Trim text fields, cap reason lengths, and drop blank or non-finite values.
    pub fn normalized(self) -> Self {
        Self {
            device_hash: clean_text(self.device_hash, usize::MAX),
            network_hash: clean_text(self.network_hash, usize::MAX),
            user_agent_hash: clean_text(self.user_agent_hash, usize::MAX),
            latitude: self.latitude.filter(|value| value.is_finite()),
            longitude: self.longitude.filter(|value| value.is_finite()),
            accuracy_meters: self
                .accuracy_meters
                .filter(|value| value.is_finite())
                .map(|value| value.max(0.0)),
            reason_code: clean_text(self.reason_code, MAX_REASON_CODE_CHARS),
            reason: clean_text(self.reason, MAX_REASON_CHARS),
        }
    }

    /// Location of the punch, present only when both coordinates were supplied.
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
            _ => None,
        }
    }

    pub fn lacks_geo(&self) -> bool {
        self.latitude.is_none() && self.longitude.is_none()
    }

    pub fn has_reason(&self) -> bool {
        self.reason
            .as_deref()
            .map(|reason| !reason.trim().is_empty())
            .unwrap_or(false)
    }

    /// Copy persisted on the audit event: hashes stay as-is, coordinates are rounded.
    pub fn redacted(&self) -> Self {
        Self {
            latitude: self.latitude.map(round_coordinate),
            longitude: self.longitude.map(round_coordinate),
            ..self.clone()
        }
    }
}

fn clean_text(value: Option<String>, max_chars: usize) -> Option<String> {
    value
        .map(|raw| raw.trim().chars().take(max_chars).collect::<String>())
        .filter(|text| !text.is_empty())
}

fn round_coordinate(value: f64) -> f64 {
    (value * STORED_COORDINATE_SCALE).round() / STORED_COORDINATE_SCALE
}

/// Kind of capture being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ClockIn,
    ClockOut,
    ManualEntry,
}

impl EventType {
    pub const fn label(self) -> &'static str {
        match self {
            EventType::ClockIn => "clock_in",
            EventType::ClockOut => "clock_out",
            EventType::ManualEntry => "manual_entry",
        }
    }
}

/// Discrete risk band derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const MEDIUM_FROM: u32 = 35;
    pub const HIGH_FROM: u32 = 70;

    pub const fn from_score(score: u32) -> Self {
        if score >= Self::HIGH_FROM {
            RiskLevel::High
        } else if score >= Self::MEDIUM_FROM {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub const fn rank(self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Lowest risk level at which a justification is demanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonRiskLevel {
    Medium,
    High,
}

impl ReasonRiskLevel {
    pub const fn rank(self) -> u8 {
        match self {
            ReasonRiskLevel::Medium => RiskLevel::Medium.rank(),
            ReasonRiskLevel::High => RiskLevel::High.rank(),
        }
    }
}

impl FromStr for ReasonRiskLevel {
    type Err = UnknownSetting;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(ReasonRiskLevel::Medium),
            "high" => Ok(ReasonRiskLevel::High),
            _ => Err(UnknownSetting::new("reason risk level", raw, "medium or high")),
        }
    }
}

/// Organization-wide enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    Observe,
    Warn,
    Hold,
    Deny,
}

impl PolicyMode {
    pub const fn label(self) -> &'static str {
        match self {
            PolicyMode::Observe => "observe",
            PolicyMode::Warn => "warn",
            PolicyMode::Hold => "hold",
            PolicyMode::Deny => "deny",
        }
    }
}

impl FromStr for PolicyMode {
    type Err = UnknownSetting;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "observe" => Ok(PolicyMode::Observe),
            "warn" => Ok(PolicyMode::Warn),
            "hold" => Ok(PolicyMode::Hold),
            "deny" => Ok(PolicyMode::Deny),
            _ => Err(UnknownSetting::new(
                "policy mode",
                raw,
                "observe, warn, hold, or deny",
            )),
        }
    }
}

/// Text that names none of a setting's variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {setting} '{value}' (expected {expected})")]
pub struct UnknownSetting {
    pub setting: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl UnknownSetting {
    fn new(setting: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            setting,
            value: value.trim().to_string(),
            expected,
        }
    }
}

/// Outcome recorded on a trust event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    Observed,
    Allowed,
    Warned,
    Held,
    Denied,
    Approved,
    Rejected,
}

impl TrustDecision {
    pub const fn label(self) -> &'static str {
        match self {
            TrustDecision::Observed => "observed",
            TrustDecision::Allowed => "allowed",
            TrustDecision::Warned => "warned",
            TrustDecision::Held => "held",
            TrustDecision::Denied => "denied",
            TrustDecision::Approved => "approved",
            TrustDecision::Rejected => "rejected",
        }
    }

    /// Every decision except `Held` is final once written.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, TrustDecision::Held)
    }
}

/// Circular allowed area for punches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl Geofence {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Active trust policy for an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub mode: PolicyMode,
    pub warn_threshold: u32,
    pub hold_threshold: u32,
    pub deny_threshold: u32,
    pub require_reason_at_risk: ReasonRiskLevel,
    pub impossible_travel_speed_kph: f64,
    pub geofence: Option<Geofence>,
    pub enabled: bool,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Observe,
            warn_threshold: 35,
            hold_threshold: 65,
            deny_threshold: 85,
            require_reason_at_risk: ReasonRiskLevel::Medium,
            impossible_travel_speed_kph: 900.0,
            geofence: None,
            enabled: true,
        }
    }
}

/// Policy as persisted for one organization, stamped with its last editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgPolicy {
    pub org_id: OrgId,
    #[serde(flatten)]
    pub policy: TrustPolicy,
    pub updated_by: Option<UserId>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Active,
    Revoked,
}

/// Learned association between an employee and a device fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedDevice {
    pub org_id: OrgId,
    pub employee_id: EmployeeId,
    pub device_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub successful_punches: u32,
    pub status: DeviceStatus,
}

/// Write deferred by a held punch, replayed verbatim on approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    ClockIn {
        date: NaiveDate,
        timestamp: DateTime<Utc>,
        status: AttendanceStatus,
    },
    ClockOut {
        record_id: RecordId,
        timestamp: DateTime<Utc>,
    },
}

/// Append-only audit entry, one per evaluated capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEvent {
    pub id: EventId,
    pub org_id: OrgId,
    pub employee_id: EmployeeId,
    pub attendance_record_id: Option<RecordId>,
    pub event_type: EventType,
    pub captured_at: DateTime<Utc>,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub policy_mode: PolicyMode,
    pub decision: TrustDecision,
    pub reason_required: bool,
    pub reasons: Vec<String>,
    pub signals: TrustSignals,
    pub review_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl TrustEvent {
    pub fn point(&self) -> Option<GeoPoint> {
        self.signals.point()
    }

    pub fn is_pending(&self) -> bool {
        self.decision == TrustDecision::Held
    }
}

/// Role resolved by the identity layer for the current caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Admin,
    HrManager,
    Manager,
    Employee,
}

impl ViewerRole {
    pub const fn label(self) -> &'static str {
        match self {
            ViewerRole::Admin => "admin",
            ViewerRole::HrManager => "hr_manager",
            ViewerRole::Manager => "manager",
            ViewerRole::Employee => "employee",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(ViewerRole::Admin),
            "hr_manager" | "hr-manager" | "hr" => Some(ViewerRole::HrManager),
            "manager" => Some(ViewerRole::Manager),
            "employee" => Some(ViewerRole::Employee),
            _ => None,
        }
    }

    pub const fn can_administer_policy(self) -> bool {
        matches!(self, ViewerRole::Admin | ViewerRole::HrManager)
    }

    pub const fn can_review(self) -> bool {
        matches!(
            self,
            ViewerRole::Admin | ViewerRole::HrManager | ViewerRole::Manager
        )
    }

    pub const fn can_enter_manual_punches(self) -> bool {
        matches!(self, ViewerRole::Admin | ViewerRole::HrManager)
    }
}

/// Authenticated caller as resolved by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub employee_id: Option<EmployeeId>,
    pub role: ViewerRole,
}
