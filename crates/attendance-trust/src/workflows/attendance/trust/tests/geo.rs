use super::common::*;
use chrono::Duration;
use proptest::prelude::*;
use std::f64::consts::PI;
use std::sync::Arc;

use crate::workflows::attendance::trust::domain::{Geofence, TrustPolicy, TrustSignals};
use crate::workflows::attendance::trust::geo::{
    distance_meters, implied_speed_kph, outside_geofence, GeoPoint, GeoRiskEvaluator,
    EARTH_RADIUS_METERS,
};
use crate::workflows::attendance::trust::repository::TrustEventRepository;

/// Degrees of latitude spanning `meters` along a meridian.
fn meridian_degrees(meters: f64) -> f64 {
    meters / (EARTH_RADIUS_METERS * PI / 180.0)
}

#[test]
fn one_degree_of_longitude_at_equator_is_about_111_km() {
    let meters = distance_meters(0.0, 0.0, 0.0, 1.0);
    assert!((meters - 111_195.0).abs() < 1.0, "got {meters}");
}

#[test]
fn antipodal_points_do_not_produce_nan() {
    let meters = distance_meters(0.0, 0.0, 0.0, 180.0);
    assert!(meters.is_finite());
    assert!((meters - PI * EARTH_RADIUS_METERS).abs() < 1.0);
}

#[test]
fn accuracy_grace_is_capped() {
    let fence = Geofence {
        latitude: 0.0,
        longitude: 0.0,
        radius_meters: 100.0,
    };
    let point = GeoPoint::new(meridian_degrees(550.0), 0.0);

    assert!(!outside_geofence(&fence, &point, Some(600.0)));
    assert!(outside_geofence(&fence, &point, Some(300.0)));
    assert!(outside_geofence(&fence, &point, None));
}

#[test]
fn grace_cap_still_rejects_points_beyond_radius_plus_cap() {
    let fence = Geofence {
        latitude: 0.0,
        longitude: 0.0,
        radius_meters: 100.0,
    };
    let point = GeoPoint::new(meridian_degrees(650.0), 0.0);

    assert!(outside_geofence(&fence, &point, Some(5_000.0)));
}

#[test]
fn implied_speed_flags_one_degree_in_one_minute() {
    let speed = implied_speed_kph(
        &GeoPoint::new(0.0, 0.0),
        morning(),
        &GeoPoint::new(0.0, 1.0),
        morning() + Duration::minutes(1),
    )
    .expect("time moved forward");

    assert!((speed - 6_671.7).abs() < 1.0, "got {speed}");
    assert!(speed > TrustPolicy::default().impossible_travel_speed_kph);
}

#[test]
fn implied_speed_requires_forward_time() {
    let here = GeoPoint::new(10.0, 10.0);
    assert_eq!(implied_speed_kph(&here, morning(), &here, morning()), None);
    assert_eq!(
        implied_speed_kph(&here, morning(), &here, morning() - Duration::seconds(5)),
        None
    );
}

#[test]
fn evaluator_ignores_partial_coordinates() {
    let repository = Arc::new(MemoryTrustRepository::default());
    let evaluator = GeoRiskEvaluator::new(repository);
    let signals = TrustSignals {
        latitude: Some(40.0),
        ..TrustSignals::default()
    };
    let policy = TrustPolicy {
        geofence: Some(office_fence()),
        ..TrustPolicy::default()
    };

    let risk = evaluator
        .evaluate(&org(), &employee("emp-ana"), &signals, &policy, morning())
        .expect("evaluation succeeds");

    assert!(!risk.outside_geofence);
    assert!(!risk.impossible_travel);
    assert_eq!(risk.implied_speed_kph, None);
}

#[test]
fn evaluator_compares_against_latest_geo_event() {
    let Harness {
        service,
        repository,
        ..
    } = harness(TrustPolicy::default());

    let mut prior = with_reason(office_signals("dev-ana"), "first day on a new phone");
    prior.latitude = Some(0.0);
    prior.longitude = Some(0.0);
    service
        .clock_in(&worker("emp-ana"), prior, morning())
        .expect("observe mode records the punch");

    let evaluator = GeoRiskEvaluator::new(repository.clone());
    let mut current = office_signals("dev-ana");
    current.latitude = Some(0.0);
    current.longitude = Some(1.0);

    let risk = evaluator
        .evaluate(
            &org(),
            &employee("emp-ana"),
            &current,
            &TrustPolicy::default(),
            morning() + Duration::minutes(1),
        )
        .expect("evaluation succeeds");

    assert!(risk.impossible_travel);
    assert!(risk.implied_speed_kph.expect("speed computed") > 6_000.0);

    let latest = repository
        .latest_geo_event_before(&org(), &employee("emp-ana"), morning() + Duration::minutes(1))
        .expect("query succeeds")
        .expect("geo event recorded");
    assert_eq!(latest.signals.latitude, Some(0.0));
}

#[test]
fn evaluator_skips_events_captured_after_the_evaluated_time() {
    let Harness {
        service,
        repository,
        ..
    } = harness(TrustPolicy::default());

    let mut early = with_reason(office_signals("dev-ana"), "first day on a new phone");
    early.latitude = Some(0.0);
    early.longitude = Some(0.0);
    service
        .clock_in(&worker("emp-ana"), early, at(8, 0))
        .expect("clock in recorded");

    let mut later = office_signals("dev-ana");
    later.latitude = Some(0.0);
    later.longitude = Some(0.0);
    service
        .clock_out(&worker("emp-ana"), later, at(17, 0))
        .expect("clock out recorded");

    let mut backdated = office_signals("dev-ana");
    backdated.latitude = Some(0.0);
    backdated.longitude = Some(1.0);
    let risk = GeoRiskEvaluator::new(repository.clone())
        .evaluate(
            &org(),
            &employee("emp-ana"),
            &backdated,
            &TrustPolicy::default(),
            at(8, 1),
        )
        .expect("evaluation succeeds");

    assert!(risk.impossible_travel);

    let baseline = repository
        .latest_geo_event_before(&org(), &employee("emp-ana"), at(8, 1))
        .expect("query succeeds")
        .expect("earlier event found");
    assert_eq!(baseline.captured_at, at(8, 0));
    assert!(repository
        .latest_geo_event_before(&org(), &employee("emp-ana"), at(8, 0))
        .expect("query succeeds")
        .is_none());
}

proptest! {
    #[test]
    fn distance_is_symmetric(
        lat1 in -90.0f64..90.0,
        lon1 in -180.0f64..180.0,
        lat2 in -90.0f64..90.0,
        lon2 in -180.0f64..180.0,
    ) {
        let forward = distance_meters(lat1, lon1, lat2, lon2);
        let backward = distance_meters(lat2, lon2, lat1, lon1);
        prop_assert!((forward - backward).abs() < 1e-6);
        prop_assert!(forward >= 0.0);
        prop_assert!(forward <= PI * EARTH_RADIUS_METERS + 1.0);
    }

    #[test]
    fn distance_to_self_is_zero(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
        prop_assert!(distance_meters(lat, lon, lat, lon).abs() < 1e-6);
    }
}
