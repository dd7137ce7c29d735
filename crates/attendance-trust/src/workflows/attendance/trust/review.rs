use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::attendance::AttendanceStore;
use super::domain::{EmployeeId, EventId, OrgId, TrustDecision, TrustEvent, Viewer, ViewerRole};
use super::ledger::{HeldActionLedger, LedgerError, ReviewDecision};
use super::repository::{RepositoryError, TrustEventFilter, TrustEventQuery, TrustEventRepository};

/// Org-chart collaborator shared with other approval flows.
pub trait ScopeResolver: Send + Sync {
    /// The manager plus their direct and transitive reports.
    fn manager_scope(
        &self,
        org_id: &OrgId,
        manager: &EmployeeId,
    ) -> Result<BTreeSet<EmployeeId>, RepositoryError>;
}

/// Set of employees whose events a reviewer may see and settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewScope {
    Organization,
    Employees(BTreeSet<EmployeeId>),
}

impl ReviewScope {
    pub fn contains(&self, employee_id: &EmployeeId) -> bool {
        match self {
            ReviewScope::Organization => true,
            ReviewScope::Employees(employees) => employees.contains(employee_id),
        }
    }

    fn into_query(self, filter: TrustEventFilter) -> TrustEventQuery {
        let employees = match self {
            ReviewScope::Organization => None,
            ReviewScope::Employees(employees) => Some(employees),
        };
        TrustEventQuery { filter, employees }
    }
}

/// Human-facing listing and approve/reject surface over held events.
pub struct ReviewWorkflow<E: ?Sized, A: ?Sized, O: ?Sized> {
    ledger: Arc<HeldActionLedger<E, A>>,
    events: Arc<E>,
    scopes: Arc<O>,
}

impl<E, A, O> ReviewWorkflow<E, A, O>
where
    E: TrustEventRepository + ?Sized,
    A: AttendanceStore + ?Sized,
    O: ScopeResolver + ?Sized,
{
    pub fn new(ledger: Arc<HeldActionLedger<E, A>>, events: Arc<E>, scopes: Arc<O>) -> Self {
        Self {
            ledger,
            events,
            scopes,
        }
    }

    pub fn scope_for(&self, viewer: &Viewer) -> Result<ReviewScope, ReviewError> {
        match viewer.role {
            ViewerRole::Admin | ViewerRole::HrManager => Ok(ReviewScope::Organization),
            ViewerRole::Manager => {
                let employees = match &viewer.employee_id {
                    Some(manager) => self.scopes.manager_scope(&viewer.org_id, manager)?,
                    None => BTreeSet::new(),
                };
                Ok(ReviewScope::Employees(employees))
            }
            ViewerRole::Employee => Err(ReviewError::Unauthorized(format!(
                "role {} cannot review attendance events",
                viewer.role.label()
            ))),
        }
    }

    pub fn list_events(
        &self,
        viewer: &Viewer,
        filter: TrustEventFilter,
    ) -> Result<Vec<TrustEvent>, ReviewError> {
        let query = self.scope_for(viewer)?.into_query(filter);
        Ok(self.events.query_events(&viewer.org_id, &query)?)
    }

    pub fn list_held(
        &self,
        viewer: &Viewer,
        limit: Option<usize>,
    ) -> Result<Vec<TrustEvent>, ReviewError> {
        self.list_events(
            viewer,
            TrustEventFilter {
                decision: Some(TrustDecision::Held),
                limit,
                ..TrustEventFilter::default()
            },
        )
    }

    pub fn review(
        &self,
        viewer: &Viewer,
        event_id: &EventId,
        decision: ReviewDecision,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TrustEvent, ReviewError> {
        let scope = self.scope_for(viewer)?;
        let event = self.ledger.fetch(&viewer.org_id, event_id)?;
        if !scope.contains(&event.employee_id) {
            return Err(ReviewError::Unauthorized(
                "event is outside the reviewer's scope".to_string(),
            ));
        }

        Ok(self.ledger.resolve(
            &viewer.org_id,
            event_id,
            decision,
            &viewer.user_id,
            note,
            at,
        )?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
