use attendance_trust::error::AppError;
use attendance_trust::workflows::attendance::trust::{
    AttendancePatch, AttendanceRecord, AttendanceStore, AttendanceStoreError, DeviceRepository,
    EmployeeId, EventId, NewAttendanceRecord, OrgId, OrgPolicy, PolicyMode, PolicyRepository,
    RecordId, RepositoryError, ScopeResolver, TrustEvent, TrustEventQuery, TrustEventRepository,
    TrustedDevice,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Policies, devices, and trust events held in process memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryTrustRepository {
    policies: Arc<Mutex<HashMap<OrgId, OrgPolicy>>>,
    devices: Arc<Mutex<HashMap<(EmployeeId, String), TrustedDevice>>>,
    events: Arc<Mutex<BTreeMap<EventId, TrustEvent>>>,
}

impl PolicyRepository for InMemoryTrustRepository {
    fn fetch_policy(&self, org_id: &OrgId) -> Result<Option<OrgPolicy>, RepositoryError> {
        let guard = self.policies.lock().expect("policy mutex poisoned");
        Ok(guard.get(org_id).cloned())
    }

    fn store_policy(&self, policy: OrgPolicy) -> Result<(), RepositoryError> {
        let mut guard = self.policies.lock().expect("policy mutex poisoned");
        guard.insert(policy.org_id.clone(), policy);
        Ok(())
    }
}

impl DeviceRepository for InMemoryTrustRepository {
    fn fetch_device(
        &self,
        employee_id: &EmployeeId,
        device_hash: &str,
    ) -> Result<Option<TrustedDevice>, RepositoryError> {
        let guard = self.devices.lock().expect("device mutex poisoned");
        Ok(guard
            .get(&(employee_id.clone(), device_hash.to_string()))
            .cloned())
    }

    fn store_device(&self, device: TrustedDevice) -> Result<(), RepositoryError> {
        let mut guard = self.devices.lock().expect("device mutex poisoned");
        guard.insert(
            (device.employee_id.clone(), device.device_hash.clone()),
            device,
        );
        Ok(())
    }
}

impl TrustEventRepository for InMemoryTrustRepository {
    fn insert_event(&self, event: TrustEvent) -> Result<TrustEvent, RepositoryError> {
        let mut guard = self.events.lock().expect("event mutex poisoned");
        if guard.contains_key(&event.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    fn update_event(&self, event: TrustEvent) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("event mutex poisoned");
        if guard.contains_key(&event.id) {
            guard.insert(event.id.clone(), event);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_event(&self, id: &EventId) -> Result<Option<TrustEvent>, RepositoryError> {
        let guard = self.events.lock().expect("event mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn latest_geo_event_before(
        &self,
        org_id: &OrgId,
        employee_id: &EmployeeId,
        before: DateTime<Utc>,
    ) -> Result<Option<TrustEvent>, RepositoryError> {
        let guard = self.events.lock().expect("event mutex poisoned");
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
        let guard = self.events.lock().expect("event mutex poisoned");
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

/// Daily attendance records held in process memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAttendanceStore {
    records: Arc<Mutex<HashMap<RecordId, AttendanceRecord>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryAttendanceStore {
    pub(crate) fn records(&self) -> Vec<AttendanceRecord> {
        let guard = self.records.lock().expect("attendance mutex poisoned");
        let mut records: Vec<_> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.clock_in.cmp(&b.clock_in));
        records
    }
}

impl AttendanceStore for InMemoryAttendanceStore {
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
            "att-{:06}",
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

/// Reporting lines as loaded from `--org-chart`: manager id to direct reports.
#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct InMemoryOrgChart {
    #[serde(default)]
    reports: HashMap<String, Vec<String>>,
}

impl InMemoryOrgChart {
    pub(crate) fn from_reports<I, M, R>(lines: I) -> Self
    where
        I: IntoIterator<Item = (M, Vec<R>)>,
        M: Into<String>,
        R: Into<String>,
    {
        let reports = lines
            .into_iter()
            .map(|(manager, reports)| {
                (
                    manager.into(),
                    reports.into_iter().map(Into::into).collect(),
                )
            })
            .collect();
        Self { reports }
    }

    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| AppError::org_chart(path, source))
    }
}

impl ScopeResolver for InMemoryOrgChart {
    fn manager_scope(
        &self,
        _org_id: &OrgId,
        manager: &EmployeeId,
    ) -> Result<BTreeSet<EmployeeId>, RepositoryError> {
        let mut scope = BTreeSet::new();
        let mut queue = VecDeque::from([manager.0.clone()]);

        while let Some(current) = queue.pop_front() {
            if !scope.insert(EmployeeId(current.clone())) {
                continue;
            }
            if let Some(reports) = self.reports.get(&current) {
                queue.extend(reports.iter().cloned());
            }
        }

        Ok(scope)
    }
}

pub(crate) fn parse_cutoff(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| format!("late cut-off '{raw}' must be formatted as HH:MM"))
}
