use crate::infra::{InMemoryAttendanceStore, InMemoryOrgChart, InMemoryTrustRepository};
use attendance_trust::error::AppError;
use attendance_trust::workflows::attendance::trust::{
    AttendanceTrustService, CaptureReceipt, EmployeeId, Geofence, ManualEntryRequest, OrgId,
    PolicyMode, ReviewDecision, ReviewRequest, TrustEngineConfig, TrustPolicy, TrustServiceError,
    TrustSignals, UserId, Viewer, ViewerRole,
};
use chrono::{Duration, Local, NaiveTime, TimeZone, Utc};
use clap::Args;
use std::sync::Arc;

type DemoService =
    AttendanceTrustService<InMemoryTrustRepository, InMemoryAttendanceStore, InMemoryOrgChart>;

const DEMO_ORG: &str = "org-demo";
const SITE: (f64, f64) = (51.5074, -0.1278);

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Policy mode applied to the demo organization
    #[arg(long, default_value = "hold")]
    pub(crate) mode: PolicyMode,
    /// Geofence radius around the demo site, in meters
    #[arg(long, default_value_t = 250.0)]
    pub(crate) radius_meters: f64,
    /// Print every trust event recorded during the demo
    #[arg(long)]
    pub(crate) show_events: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Hold,
            radius_meters: 250.0,
            show_events: false,
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        mode,
        radius_meters,
        show_events,
    } = args;

    let policy = TrustPolicy {
        mode,
        geofence: Some(Geofence {
            latitude: SITE.0,
            longitude: SITE.1,
            radius_meters,
        }),
        ..TrustPolicy::default()
    };
    let attendance = Arc::new(InMemoryAttendanceStore::default());
    let org_chart = InMemoryOrgChart::from_reports([("emp-lead", vec!["emp-ada", "emp-kit"])]);
    let service: DemoService = AttendanceTrustService::new(
        Arc::new(InMemoryTrustRepository::default()),
        attendance.clone(),
        Arc::new(org_chart),
        TrustEngineConfig {
            default_policy: policy,
            ..TrustEngineConfig::default()
        },
    );

    let day = Local::now().date_naive();
    let start = Utc.from_utc_datetime(
        &day.and_time(NaiveTime::from_hms_opt(8, 50, 0).unwrap_or(NaiveTime::MIN)),
    );

    println!("Attendance trust demo ({} mode)", mode.label());

    let ada = viewer("emp-ada", ViewerRole::Employee);
    let lead = viewer("emp-lead", ViewerRole::Manager);
    let hr = viewer("emp-hr", ViewerRole::HrManager);

    println!("\n1. Ada clocks in on a phone the system has never seen, without a reason");
    report(service.clock_in(&ada, on_site("ada-phone", None), start));

    println!("\n2. Ada resubmits with a reason");
    report(service.clock_in(
        &ada,
        on_site("ada-phone", Some("new phone, old one broke")),
        start + Duration::minutes(1),
    ));

    println!("\n3. Ada clocks out from home on a laptop with a weak location fix");
    let home = TrustSignals {
        device_hash: Some("ada-laptop".to_string()),
        latitude: Some(SITE.0 + 0.08),
        longitude: Some(SITE.1),
        accuracy_meters: Some(350.0),
        reason: Some("wrapped up remotely".to_string()),
        ..TrustSignals::default()
    };
    let held = service.clock_out(&ada, home, start + Duration::hours(8));
    let held_id = match &held {
        Err(TrustServiceError::PunchHeld { event_id }) => Some(event_id.clone()),
        _ => None,
    };
    report(held);

    if let Some(event_id) = held_id {
        let queue = service.list_held_events(&lead, None)?;
        println!(
            "\n4. Ada's lead sees {} held punch(es) and approves {}",
            queue.len(),
            event_id
        );
        let resolved = service.review_held_event(
            &lead,
            &event_id,
            ReviewRequest {
                decision: ReviewDecision::Approved,
                note: Some("confirmed on a call".to_string()),
            },
            start + Duration::hours(8) + Duration::minutes(20),
        )?;
        println!(
            "   decision={} record={}",
            resolved.decision.label(),
            resolved
                .attendance_record_id
                .map(|id| id.0)
                .unwrap_or_else(|| "-".to_string())
        );
    }

    println!("\n5. HR enters a forgotten punch for Kit from the HR office");
    report(service.manual_entry(
        &hr,
        ManualEntryRequest {
            employee_id: EmployeeId("emp-kit".to_string()),
            date: day,
            clock_in: start,
            clock_out: Some(start + Duration::hours(7)),
            status: None,
            signals: on_site("hr-desktop", None),
        },
        start + Duration::hours(9),
    ));

    println!("\nAttendance records");
    for record in attendance.records() {
        println!(
            "- {} {} in={} out={} status={} minutes={}",
            record.employee_id,
            record.date,
            record.clock_in.format("%H:%M"),
            record
                .clock_out
                .map(|at| at.format("%H:%M").to_string())
                .unwrap_or_else(|| "open".to_string()),
            record.status.label(),
            record
                .work_minutes
                .map(|minutes| minutes.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    if show_events {
        println!("\nTrust events");
        for event in service.list_trust_events(&hr, Default::default())? {
            println!(
                "- {} {} {} score={} level={} decision={} reasons=[{}]",
                event.id,
                event.employee_id,
                event.event_type.label(),
                event.risk_score,
                event.risk_level.label(),
                event.decision.label(),
                event.reasons.join(", ")
            );
        }
    }

    Ok(())
}

fn viewer(employee_id: &str, role: ViewerRole) -> Viewer {
    Viewer {
        user_id: UserId(format!("user-{employee_id}")),
        org_id: OrgId(DEMO_ORG.to_string()),
        employee_id: Some(EmployeeId(employee_id.to_string())),
        role,
    }
}

fn on_site(device: &str, reason: Option<&str>) -> TrustSignals {
    TrustSignals {
        device_hash: Some(device.to_string()),
        latitude: Some(SITE.0 + 0.0002),
        longitude: Some(SITE.1),
        accuracy_meters: Some(20.0),
        reason: reason.map(str::to_string),
        ..TrustSignals::default()
    }
}

fn report(outcome: Result<CaptureReceipt, TrustServiceError>) {
    match outcome {
        Ok(receipt) => println!(
            "   accepted: record={} decision={} score={} reasons=[{}]",
            receipt.record_id,
            receipt.assessment.decision.label(),
            receipt.assessment.risk_score,
            receipt.assessment.reasons.join(", ")
        ),
        Err(err) => println!("   refused: {err}"),
    }
}
