use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    EmployeeId, EventId, OrgId, OrgPolicy, RiskLevel, TrustDecision, TrustEvent, TrustedDevice,
};

pub const DEFAULT_EVENT_LIMIT: usize = 100;
pub const MAX_EVENT_LIMIT: usize = 500;

/// Storage for per-organization trust policies. Latest value only.
pub trait PolicyRepository: Send + Sync {
    fn fetch_policy(&self, org_id: &OrgId) -> Result<Option<OrgPolicy>, RepositoryError>;
    fn store_policy(&self, policy: OrgPolicy) -> Result<(), RepositoryError>;
}

/// Storage for learned employee/device associations.
pub trait DeviceRepository: Send + Sync {
    fn fetch_device(
        &self,
        employee_id: &EmployeeId,
        device_hash: &str,
    ) -> Result<Option<TrustedDevice>, RepositoryError>;
    fn store_device(&self, device: TrustedDevice) -> Result<(), RepositoryError>;
}

/// Append-only trust event log.
pub trait TrustEventRepository: Send + Sync {
    /// Persist a new event. Fails with `Conflict` when the id is already taken.
    fn insert_event(&self, event: TrustEvent) -> Result<TrustEvent, RepositoryError>;
    /// Replace an existing event. Fails with `NotFound` when the id is unknown.
    fn update_event(&self, event: TrustEvent) -> Result<(), RepositoryError>;
    fn fetch_event(&self, id: &EventId) -> Result<Option<TrustEvent>, RepositoryError>;
    /// Most recent event for the employee in this org that carries coordinates and was
    /// captured strictly before `before`.
    fn latest_geo_event_before(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        before: DateTime<Utc>,
    ) -> Result<Option<TrustEvent>, RepositoryError>;
    /// Events of one org matching the query, newest capture first, truncated to the query limit.
    fn query_events(
        &self,
        org_id: &OrgId,
        query: &TrustEventQuery,
    ) -> Result<Vec<TrustEvent>, RepositoryError>;
}

/// Everything the engine persists itself, so one backend can serve all components.
pub trait TrustRepository: PolicyRepository + DeviceRepository + TrustEventRepository {}

impl<T> TrustRepository for T where T: PolicyRepository + DeviceRepository + TrustEventRepository {}

/// Caller-facing filters for the trust event listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEventFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub risk_level: Option<RiskLevel>,
    pub employee_id: Option<EmployeeId>,
    pub decision: Option<TrustDecision>,
    pub limit: Option<usize>,
}

impl TrustEventFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_EVENT_LIMIT)
            .clamp(1, MAX_EVENT_LIMIT)
    }

    pub fn matches(&self, event: &TrustEvent) -> bool {
        let date = event.captured_at.date_naive();
        self.from.map(|from| date >= from).unwrap_or(true)
            && self.to.map(|to| date <= to).unwrap_or(true)
            && self
                .risk_level
                .map(|level| event.risk_level == level)
                .unwrap_or(true)
            && self
                .employee_id
                .as_ref()
                .map(|employee| &event.employee_id == employee)
                .unwrap_or(true)
            && self
                .decision
                .map(|decision| event.decision == decision)
                .unwrap_or(true)
    }
}

/// Repository query: caller filters plus the reviewer's visible employee set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustEventQuery {
    pub filter: TrustEventFilter,
    /// `None` means organization-wide visibility.
    pub employees: Option<BTreeSet<EmployeeId>>,
}

impl TrustEventQuery {
    pub fn matches(&self, event: &TrustEvent) -> bool {
        self.filter.matches(event)
            && self
                .employees
                .as_ref()
                .map(|visible| visible.contains(&event.employee_id))
                .unwrap_or(true)
    }

    pub fn limit(&self) -> usize {
        self.filter.effective_limit()
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
