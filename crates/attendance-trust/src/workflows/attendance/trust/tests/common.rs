use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::attendance::trust::attendance::{
    AttendancePatch, AttendanceRecord, AttendanceStore, AttendanceStoreError,
    NewAttendanceRecord,
};
use crate::workflows::attendance::trust::domain::{
    EmployeeId, EventId, Geofence, OrgId, OrgPolicy, PolicyMode, RecordId, TrustEvent,
    TrustPolicy, TrustSignals, TrustedDevice, UserId, Viewer, ViewerRole,
};
use crate::workflows::attendance::trust::repository::{
    DeviceRepository, PolicyRepository, RepositoryError, TrustEventQuery, TrustEventRepository,
};
use crate::workflows::attendance::trust::review::ScopeResolver;
use crate::workflows::attendance::trust::{
    attendance_trust_router, AttendanceTrustService, TrustEngineConfig,
};

pub(super) type TestService =
    AttendanceTrustService<MemoryTrustRepository, MemoryAttendanceStore, StaticScopes>;

pub(super) const ORG: &str = "org-harbor";

pub(super) fn org() -> OrgId {
    OrgId(ORG.to_string())
}

pub(super) fn employee(id: &str) -> EmployeeId {
    EmployeeId(id.to_string())
}

/// Weekday morning, before the late cut-off.
pub(super) fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 8, 55, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn work_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date")
}

pub(super) fn viewer(role: ViewerRole, user: &str, employee_id: Option<&str>) -> Viewer {
    Viewer {
        user_id: UserId(user.to_string()),
        org_id: org(),
        employee_id: employee_id.map(employee),
        role,
    }
}

pub(super) fn worker(id: &str) -> Viewer {
    viewer(ViewerRole::Employee, &format!("user-{id}"), Some(id))
}

pub(super) fn admin() -> Viewer {
    viewer(ViewerRole::Admin, "user-admin", Some("emp-admin"))
}

pub(super) fn hr() -> Viewer {
    viewer(ViewerRole::HrManager, "user-hr", Some("emp-hr"))
}

pub(super) fn manager() -> Viewer {
    viewer(ViewerRole::Manager, "user-mgr", Some("emp-mgr"))
}

pub(super) fn hold_policy() -> TrustPolicy {
    TrustPolicy {
        mode: PolicyMode::Hold,
        ..TrustPolicy::default()
    }
}

pub(super) fn office_fence() -> Geofence {
    Geofence {
        latitude: 40.7128,
        longitude: -74.0060,
        radius_meters: 150.0,
    }
}

/// Known device, at the office, with a tight fix.
pub(super) fn office_signals(device: &str) -> TrustSignals {
    TrustSignals {
        device_hash: Some(device.to_string()),
        network_hash: Some("net-office".to_string()),
        latitude: Some(40.7129),
        longitude: Some(-74.0061),
        accuracy_meters: Some(12.0),
        ..TrustSignals::default()
    }
}

pub(super) fn bare_signals() -> TrustSignals {
    TrustSignals::default()
}

pub(super) fn with_reason(mut signals: TrustSignals, reason: &str) -> TrustSignals {
    signals.reason = Some(reason.to_string());
    signals
}

pub(super) fn engine_config(policy: TrustPolicy) -> TrustEngineConfig {
    TrustEngineConfig {
        default_policy: policy,
        ..TrustEngineConfig::default()
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryTrustRepository>,
    pub(super) attendance: Arc<MemoryAttendanceStore>,
}

pub(super) fn harness(policy: TrustPolicy) -> Harness {
    let repository = Arc::new(MemoryTrustRepository::default());
    let attendance = Arc::new(MemoryAttendanceStore::default());
    let scopes = Arc::new(StaticScopes::with_team("emp-mgr", &["emp-ana", "emp-ben"]));
    let service = Arc::new(AttendanceTrustService::new(
        repository.clone(),
        attendance.clone(),
        scopes,
        engine_config(policy),
    ));

    Harness {
        service,
        repository,
        attendance,
    }
}

pub(super) fn trust_router(service: Arc<TestService>) -> Router {
    attendance_trust_router(service)
}

#[derive(Default)]
pub(super) struct MemoryTrustRepository {
    pub(super) policies: Mutex<HashMap<OrgId, OrgPolicy>>,
    pub(super) devices: Mutex<HashMap<(EmployeeId, String), TrustedDevice>>,
    pub(super) events: Mutex<BTreeMap<EventId, TrustEvent>>,
}

impl MemoryTrustRepository {
    pub(super) fn events(&self) -> Vec<TrustEvent> {
        let guard = self.events.lock().expect("repository mutex poisoned");
        guard.values().cloned().collect()
    }

    pub(super) fn device(&self, employee_id: &str, hash: &str) -> Option<TrustedDevice> {
        let guard = self.devices.lock().expect("repository mutex poisoned");
        guard
            .get(&(employee(employee_id), hash.to_string()))
            .cloned()
    }
}

impl PolicyRepository for MemoryTrustRepository {
    fn fetch_policy(&self, org_id: &OrgId) -> Result<Option<OrgPolicy>, RepositoryError> {
        let guard = self.policies.lock().expect("repository mutex poisoned");
        Ok(guard.get(org_id).cloned())
    }

    fn store_policy(&self, policy: OrgPolicy) -> Result<(), RepositoryError> {
        let mut guard = self.policies.lock().expect("repository mutex poisoned");
        guard.insert(policy.org_id.clone(), policy);
        Ok(())
    }
}

impl DeviceRepository for MemoryTrustRepository {
    fn fetch_device(
        &self,
        employee_id: &EmployeeId,
        device_hash: &str,
    ) -> Result<Option<TrustedDevice>, RepositoryError> {
        let guard = self.devices.lock().expect("repository mutex poisoned");
        Ok(guard
            .get(&(employee_id.clone(), device_hash.to_string()))
            .cloned())
    }

    fn store_device(&self, device: TrustedDevice) -> Result<(), RepositoryError> {
        let mut guard = self.devices.lock().expect("repository mutex poisoned");
        guard.insert(
            (device.employee_id.clone(), device.device_hash.clone()),
            device,
        );
        Ok(())
    }
}

impl TrustEventRepository for MemoryTrustRepository {
    fn insert_event(&self, event: TrustEvent) -> Result<TrustEvent, RepositoryError> {
        let mut guard = self.events.lock().expect("repository mutex poisoned");
        if guard.contains_key(&event.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    fn update_event(&self, event: TrustEvent) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("repository mutex poisoned");
        match guard.get_mut(&event.id) {
            Some(slot) => {
                *slot = event;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_event(&self, id: &EventId) -> Result<Option<TrustEvent>, RepositoryError> {
        let guard = self.events.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn latest_geo_event_before(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        before: DateTime<Utc>,
    ) -> Result<Option<TrustEvent>, RepositoryError> {
        let guard = self.events.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|event| &event.org_id == org_id && &event.employee_id == employee_id)
            .filter(|event| event.point().is_some() && event.captured_at < before)
            .max_by_key(|event| event.captured_at)
            .cloned())
    }

    fn query_events(
        &self,
        org_id: &OrgId,
        query: &TrustEventQuery,
    ) -> Result<Vec<TrustEvent>, RepositoryError> {
        let guard = self.events.lock().expect("repository mutex poisoned");
        let mut events: Vec<TrustEvent> = guard
            .values()
            .filter(|event| &event.org_id == org_id && query.matches(event))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        events.truncate(query.limit());
        Ok(events)
    }
}

/// Fails every call, for exercising the 500 path.
pub(super) struct UnavailableRepository;

impl PolicyRepository for UnavailableRepository {
    fn fetch_policy(&self, _org_id: &OrgId) -> Result<Option<OrgPolicy>, RepositoryError> {
        Err(RepositoryError::Unavailable("policy store offline".to_string()))
    }

    fn store_policy(&self, _policy: OrgPolicy) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("policy store offline".to_string()))
    }
}

impl DeviceRepository for UnavailableRepository {
    fn fetch_device(
        &self,
        _employee_id: &EmployeeId,
        _device_hash: &str,
    ) -> Result<Option<TrustedDevice>, RepositoryError> {
        Err(RepositoryError::Unavailable("device store offline".to_string()))
    }

    fn store_device(&self, _device: TrustedDevice) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("device store offline".to_string()))
    }
}

impl TrustEventRepository for UnavailableRepository {
    fn insert_event(&self, _event: TrustEvent) -> Result<TrustEvent, RepositoryError> {
        Err(RepositoryError::Unavailable("event log offline".to_string()))
    }

    fn update_event(&self, _event: TrustEvent) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("event log offline".to_string()))
    }

    fn fetch_event(&self, _id: &EventId) -> Result<Option<TrustEvent>, RepositoryError> {
        Err(RepositoryError::Unavailable("event log offline".to_string()))
    }

    fn latest_geo_event_before(
        &self,
        _org_id: &OrgId,
        _employee_id: &EmployeeId,
        _before: DateTime<Utc>,
    ) -> Result<Option<TrustEvent>, RepositoryError> {
        Err(RepositoryError::Unavailable("event log offline".to_string()))
    }

    fn query_events(
        &self,
        _org_id: &OrgId,
        _query: &TrustEventQuery,
    ) -> Result<Vec<TrustEvent>, RepositoryError> {
        Err(RepositoryError::Unavailable("event log offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryAttendanceStore {
    pub(super) records: Mutex<HashMap<RecordId, AttendanceRecord>>,
    sequence: AtomicU64,
}

impl MemoryAttendanceStore {
    pub(super) fn records(&self) -> Vec<AttendanceRecord> {
        let guard = self.records.lock().expect("attendance mutex poisoned");
        guard.values().cloned().collect()
    }

    pub(super) fn record_for(&self, employee_id: &str) -> Option<AttendanceRecord> {
        self.records()
            .into_iter()
            .find(|record| record.employee_id == employee(employee_id))
    }
}

impl AttendanceStore for MemoryAttendanceStore {
    fn find_by_employee_date(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceStoreError> {
        let guard = self.records.lock().expect("attendance mutex poisoned");
        Ok(guard
            .values()
            .find(|record| &record.employee_id == employee_id && record.date == date)
            .cloned())
    }

    fn create(&self, record: NewAttendanceRecord) -> Result<RecordId, AttendanceStoreError> {
        let mut guard = self.records.lock().expect("attendance mutex poisoned");
        if guard
            .values()
            .any(|existing| {
                existing.employee_id == record.employee_id && existing.date == record.date
            })
        {
            return Err(AttendanceStoreError::DuplicatePunch);
        }

        let id = RecordId(format!(
            "att-{}",
            self.sequence.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let work_minutes = record.work_minutes();
        guard.insert(
            id.clone(),
            AttendanceRecord {
                id: id.clone(),
                org_id: record.org_id,
                employee_id: record.employee_id,
                date: record.date,
                clock_in: record.clock_in,
                clock_out: record.clock_out,
                status: record.status,
                work_minutes,
            },
        );
        Ok(id)
    }

    fn patch(&self, id: &RecordId, patch: AttendancePatch) -> Result<(), AttendanceStoreError> {
        let mut guard = self.records.lock().expect("attendance mutex poisoned");
        let record = guard.get_mut(id).ok_or(AttendanceStoreError::NotFound)?;
        if let Some(clock_out) = patch.clock_out {
            record.clock_out = Some(clock_out);
        }
        if let Some(minutes) = patch.work_minutes {
            record.work_minutes = Some(minutes);
        }
        Ok(())
    }

    fn get(&self, id: &RecordId) -> Result<Option<AttendanceRecord>, AttendanceStoreError> {
        let guard = self.records.lock().expect("attendance mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

/// Store that loses every race: the day always looks free, but the write is refused.
pub(super) struct RacingAttendanceStore;

impl AttendanceStore for RacingAttendanceStore {
    fn find_by_employee_date(
        &self,
        _employee_id: &EmployeeId,
        _date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceStoreError> {
        Ok(None)
    }

    fn create(&self, _record: NewAttendanceRecord) -> Result<RecordId, AttendanceStoreError> {
        Err(AttendanceStoreError::DuplicatePunch)
    }

    fn patch(&self, _id: &RecordId, _patch: AttendancePatch) -> Result<(), AttendanceStoreError> {
        Err(AttendanceStoreError::Unavailable("attendance store offline".to_string()))
    }

    fn get(&self, _id: &RecordId) -> Result<Option<AttendanceRecord>, AttendanceStoreError> {
        Ok(None)
    }
}

/// Fixed org chart: each manager maps to their team.
#[derive(Default)]
pub(super) struct StaticScopes {
    teams: HashMap<EmployeeId, BTreeSet<EmployeeId>>,
}

impl StaticScopes {
    pub(super) fn with_team(manager: &str, reports: &[&str]) -> Self {
        let mut team: BTreeSet<EmployeeId> = reports.iter().map(|id| employee(id)).collect();
        team.insert(employee(manager));
        let mut teams = HashMap::new();
        teams.insert(employee(manager), team);
        Self { teams }
    }
}

impl ScopeResolver for StaticScopes {
    fn manager_scope(
        &self,
        _org_id: &OrgId,
        manager: &EmployeeId,
    ) -> Result<BTreeSet<EmployeeId>, RepositoryError> {
        Ok(self
            .teams
            .get(manager)
            .cloned()
            .unwrap_or_else(|| BTreeSet::from([manager.clone()])))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
