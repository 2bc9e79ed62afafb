//! Scenario tests for the vehicle-position matcher (§ the S3–S6 cases) and
//! the feed encoding, all on synthetic snapshots.

use chrono::{TimeZone, Utc};
use prost::Message;
use warsaw_rt::gtfs::time::ClockTime;
use warsaw_rt::gtfs_rt::FeedMessage;
use warsaw_rt::positions::api::ApiVehicle;
use warsaw_rt::positions::brigades::{BrigadeEntry, BrigadeMap};
use warsaw_rt::positions::{VehicleContainer, VehicleMap};

fn brigade_entry(trip: &str, timepoint: &str, pos: (f64, f64)) -> BrigadeEntry {
    BrigadeEntry {
        trip_id: trip.to_string(),
        last_stop_pos: pos,
        last_stop_timepoint: timepoint.to_string(),
        last_stop_time: ClockTime::from_schedule(timepoint).unwrap(),
    }
}

/// Grouping for `V/100/1`: trip A ends 11:30:00 at X (52.20, 21.00),
/// trip B ends 12:30:00 at Y (52.30, 21.10).
fn duty_map() -> BrigadeMap {
    let mut map = BrigadeMap::new();
    map.insert(
        "V/100/1".to_string(),
        vec![
            brigade_entry("trip-a", "11:30:00", (52.2000, 21.0000)),
            brigade_entry("trip-b", "12:30:00", (52.3000, 21.1000)),
        ],
    );
    map
}

fn api_vehicle(lat: f64, lon: f64) -> ApiVehicle {
    ApiVehicle {
        lat,
        lon,
        time: "2024-05-06 11:29:00".to_string(),
        lines: "100".to_string(),
        brigade: "1".to_string(),
        vehicle_number: "1234".to_string(),
    }
}

/// A container whose comparison clock is pinned to the given UTC wall time.
fn container_at(h: u32, m: u32, s: u32) -> VehicleContainer {
    let synced_at = Utc.with_ymd_and_hms(2024, 5, 6, h, m, s).unwrap();
    let mut container = VehicleContainer::new(synced_at);
    container.compare_now = ClockTime::from_instant(&synced_at);
    container
}

fn previous_on(trip: &str, lat: f64, lon: f64, bearing: f64) -> VehicleMap {
    let mut container = container_at(11, 0, 0);
    container.prepare(&[api_vehicle(lat, lon)]).unwrap();
    let mut prev = container.vehicles;
    let vehicle = prev.get_mut("V/100/1").unwrap();
    vehicle.trip = trip.to_string();
    vehicle.bearing = bearing;
    prev
}

#[test]
fn s3_no_prev_picks_the_running_trip() {
    let mut container = container_at(11, 45, 0);
    container.prepare(&[api_vehicle(52.25, 21.05)]).unwrap();
    container.match_all(&duty_map(), &VehicleMap::new()).unwrap();

    assert_eq!(container.vehicles["V/100/1"].trip, "trip-b");
}

#[test]
fn s4_advances_on_arrival_at_terminus() {
    // 11:29:30, within 30 m of X.
    let prev = previous_on("trip-a", 52.2001, 21.0000, 0.0);
    let mut container = container_at(11, 29, 30);
    container.prepare(&[api_vehicle(52.2002, 21.0000)]).unwrap();
    container.match_all(&duty_map(), &prev).unwrap();

    assert_eq!(container.vehicles["V/100/1"].trip, "trip-b");
}

#[test]
fn s5_fail_safe_after_thirty_minutes() {
    // 12:10, far from X: secondsToEnd = −2400 < −1800.
    let prev = previous_on("trip-a", 52.2600, 21.0600, 0.0);
    let mut container = container_at(12, 10, 0);
    container.prepare(&[api_vehicle(52.2600, 21.0600)]).unwrap();
    container.match_all(&duty_map(), &prev).unwrap();

    assert_eq!(container.vehicles["V/100/1"].trip, "trip-b");
}

#[test]
fn s6_bearing_held_for_tiny_displacement() {
    let prev = previous_on("trip-b", 52.2300, 21.0100, 90.0);
    let mut container = container_at(11, 45, 0);
    container.prepare(&[api_vehicle(52.2300, 21.0101)]).unwrap();
    container.match_all(&duty_map(), &prev).unwrap();

    let vehicle = &container.vehicles["V/100/1"];
    assert_eq!(vehicle.bearing, 90.0);
}

#[test]
fn vehicle_kept_mid_trip() {
    // 11:29:30 but far from the terminal: stays on trip A.
    let prev = previous_on("trip-a", 52.2500, 21.0500, 0.0);
    let mut container = container_at(11, 29, 30);
    container.prepare(&[api_vehicle(52.2500, 21.0500)]).unwrap();
    container.match_all(&duty_map(), &prev).unwrap();

    assert_eq!(container.vehicles["V/100/1"].trip, "trip-a");
}

#[test]
fn midnight_rollover_keeps_late_trips_running() {
    let mut map = BrigadeMap::new();
    map.insert(
        "V/100/1".to_string(),
        vec![
            brigade_entry("trip-late", "25:10:00", (52.2000, 21.0000)),
        ],
    );

    // 00:30 wall clock: trip ending 25:10 is still in the future.
    let mut container = container_at(0, 30, 0);
    container.prepare(&[api_vehicle(52.25, 21.05)]).unwrap();
    container.match_all(&map, &VehicleMap::new()).unwrap();

    assert_eq!(container.vehicles["V/100/1"].trip, "trip-late");
}

#[test]
fn inactive_vehicles_never_reach_the_feed() {
    let mut container = container_at(11, 45, 0);
    let mut stray = api_vehicle(52.25, 21.05);
    stray.lines = "999".to_string();
    container
        .prepare(&[api_vehicle(52.25, 21.05), stray])
        .unwrap();
    container.match_all(&duty_map(), &VehicleMap::new()).unwrap();

    let message = container.as_feed_message();
    assert_eq!(message.entity.len(), 1);
    assert_eq!(message.entity[0].id, "V/100/1");

    // Every emitted vehicle carries a non-empty trip and an in-range bearing.
    for vehicle in container.vehicles.values() {
        assert!(!vehicle.trip.is_empty());
        assert!(vehicle.bearing > -180.0 && vehicle.bearing <= 180.0);
    }
}

#[test]
fn same_snapshot_and_prev_map_give_identical_feeds() {
    let prev = previous_on("trip-a", 52.2500, 21.0500, 45.0);
    let snapshot = [api_vehicle(52.2510, 21.0510)];

    let run = || {
        let mut container = container_at(11, 29, 30);
        container.prepare(&snapshot).unwrap();
        container.match_all(&duty_map(), &prev).unwrap();
        container.as_feed_message()
    };

    assert_eq!(run(), run());
}

#[test]
fn feed_round_trips_vehicle_fields() {
    let prev = previous_on("trip-b", 52.2000, 21.0000, 0.0);
    let mut container = container_at(11, 45, 0);
    container.prepare(&[api_vehicle(52.3000, 21.1000)]).unwrap();
    container.match_all(&duty_map(), &prev).unwrap();

    let encoded = container.as_feed_message().encode_to_vec();
    let decoded = FeedMessage::decode(encoded.as_slice()).unwrap();

    assert_eq!(decoded.entity.len(), 1);
    let entity = &decoded.entity[0];
    assert_eq!(entity.id, "V/100/1");

    let position = entity.vehicle.as_ref().unwrap();
    assert_eq!(
        position.trip.as_ref().unwrap().trip_id.as_deref(),
        Some("trip-b")
    );
    let descriptor = position.vehicle.as_ref().unwrap();
    assert_eq!(descriptor.id.as_deref(), Some("V/100/1"));
    assert_eq!(descriptor.label.as_deref(), Some("1234"));

    let point = position.position.as_ref().unwrap();
    assert!((point.latitude - 52.3).abs() < 1e-4);
    assert!((point.longitude - 21.1).abs() < 1e-4);
    // Moving from trip-b's start towards (52.30, 21.10): bearing recomputed,
    // decoded as the same f32.
    assert_eq!(
        point.bearing,
        Some(container.vehicles["V/100/1"].bearing as f32)
    );
    assert_eq!(
        position.timestamp,
        Some(
            Utc.with_ymd_and_hms(2024, 5, 6, 11, 29, 0)
                .unwrap()
                .timestamp() as u64
        )
    );
}
