//! Vehicle records and the stateful vehicle-to-trip matcher.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::api::ApiVehicle;
use super::brigades::BrigadeEntry;
use super::geo;
use crate::error::{Error, Result};
use crate::gtfs::time::ClockTime;
use crate::gtfs_rt::{
    FeedEntity, Position, TripDescriptor, VehicleDescriptor, VehiclePosition,
};

/// Advance to the next trip when the vehicle is this close (km) to the
/// previous trip's terminal...
const NEAR_TERMINUS_KM: f64 = 0.05;
/// ...and this close (seconds) to its scheduled end.
const NEAR_END_SECONDS: i64 = 240;
/// Fail-safe: assume no trip runs more than 30 minutes late.
const SHOULDVE_FINISHED_SECONDS: i64 = -1800;
/// Below this displacement (km) the previous bearing is kept.
const BEARING_HOLD_KM: f64 = 0.02;

#[derive(Debug, Clone, Serialize)]
pub struct Vehicle {
    pub id: String,
    #[serde(rename = "timestamp")]
    pub time: String,
    pub lat: f64,
    pub lon: f64,
    pub side_number: String,
    #[serde(rename = "trip_id")]
    pub trip: String,
    pub bearing: f64,

    #[serde(skip)]
    pub line: String,
    #[serde(skip)]
    pub brigade: String,
    #[serde(skip)]
    pub time_obj: NaiveDateTime,
}

impl Vehicle {
    /// Builds a vehicle record from an API entry. A report time that does
    /// not parse is fatal — the whole snapshot is suspect then.
    pub fn from_api(entry: &ApiVehicle) -> Result<Vehicle> {
        let time_obj = NaiveDateTime::parse_from_str(&entry.time, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| Error::InvalidTime(entry.time.clone()))?;

        Ok(Vehicle {
            id: format!("V/{}/{}", entry.lines, entry.brigade),
            time: time_obj.format("%Y-%m-%dT%H:%M:%S").to_string(),
            lat: entry.lat,
            lon: entry.lon,
            side_number: entry.vehicle_number.clone(),
            trip: String::new(),
            bearing: 0.0,
            line: entry.lines.clone(),
            brigade: entry.brigade.clone(),
            time_obj,
        })
    }

    /// Matches this vehicle to a trip of its brigade duty.
    ///
    /// An empty duty marks the vehicle inactive: the trip stays empty and
    /// the container drops the record. Without a previous record the first
    /// trip ending in the future wins (or the last trip when the day is
    /// over). With one, the vehicle keeps its trip until it is both near
    /// the terminal and near the scheduled end, or the fail-safe decides
    /// the trip must be over.
    pub fn match_trip(
        &mut self,
        prev: Option<&Vehicle>,
        now: &ClockTime,
        duty: &[BrigadeEntry],
    ) -> Result<()> {
        if duty.is_empty() {
            return Ok(());
        }
        match prev {
            None => self.match_without_prev(now, duty),
            Some(prev) => self.match_with_prev(prev, now, duty),
        }
    }

    fn match_without_prev(&mut self, now: &ClockTime, duty: &[BrigadeEntry]) -> Result<()> {
        for entry in duty {
            if entry.last_stop_time.is_after(now)? {
                self.trip = entry.trip_id.clone();
                return Ok(());
            }
        }

        // Past the last scheduled end: assume the vehicle is still
        // finishing its final trip.
        self.trip = duty[duty.len() - 1].trip_id.clone();
        Ok(())
    }

    fn match_with_prev(
        &mut self,
        prev: &Vehicle,
        now: &ClockTime,
        duty: &[BrigadeEntry],
    ) -> Result<()> {
        let Some(prev_idx) = duty.iter().position(|e| e.trip_id == prev.trip) else {
            // The schedule changed under us; start from scratch.
            return self.match_without_prev(now, duty);
        };
        if prev_idx == duty.len() - 1 {
            self.trip = prev.trip.clone();
            return Ok(());
        }

        let prev_entry = &duty[prev_idx];
        let (term_lat, term_lon) = prev_entry.last_stop_pos;
        let seconds_to_end = prev_entry.last_stop_time.seconds_since(now)?;

        let near_terminus = geo::haversine(self.lat, self.lon, term_lat, term_lon) <= NEAR_TERMINUS_KM;
        let near_end_time = seconds_to_end < NEAR_END_SECONDS;
        let shouldve_finished = seconds_to_end < SHOULDVE_FINISHED_SECONDS;

        if (near_terminus && near_end_time) || shouldve_finished {
            self.trip = duty[prev_idx + 1].trip_id.clone();
        } else {
            self.trip = prev.trip.clone();
        }
        Ok(())
    }

    /// Updates the bearing from the previous report. No previous report
    /// leaves the bearing at zero; a displacement under 20 m keeps the
    /// previous bearing (jitter would swing it wildly at standstill).
    pub fn update_bearing(&mut self, prev: Option<&Vehicle>) {
        let Some(prev) = prev else {
            return;
        };
        if geo::haversine(prev.lat, prev.lon, self.lat, self.lon) < BEARING_HOLD_KM {
            self.bearing = prev.bearing;
        } else {
            self.bearing = geo::initial_bearing(prev.lat, prev.lon, self.lat, self.lon);
        }
    }

    pub fn as_entity(&self) -> FeedEntity {
        FeedEntity {
            id: self.id.clone(),
            is_deleted: None,
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some(self.trip.clone()),
                    ..Default::default()
                }),
                vehicle: Some(VehicleDescriptor {
                    id: Some(self.id.clone()),
                    label: Some(self.side_number.clone()),
                    license_plate: None,
                }),
                position: Some(Position {
                    latitude: self.lat as f32,
                    longitude: self.lon as f32,
                    bearing: Some(self.bearing as f32),
                    odometer: None,
                    speed: None,
                }),
                timestamp: Some(self.time_obj.and_utc().timestamp() as u64),
            }),
            alert: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn api_entry() -> ApiVehicle {
        ApiVehicle {
            lat: 52.2300,
            lon: 21.0100,
            time: "2024-05-06 11:45:00".to_string(),
            lines: "100".to_string(),
            brigade: "1".to_string(),
            vehicle_number: "1234".to_string(),
        }
    }

    fn duty() -> Vec<BrigadeEntry> {
        let entry = |trip: &str, pos, tp: &str| BrigadeEntry {
            trip_id: trip.to_string(),
            last_stop_pos: pos,
            last_stop_timepoint: tp.to_string(),
            last_stop_time: ClockTime::from_schedule(tp).unwrap(),
        };
        vec![
            entry("trip-a", (52.2000, 21.0000), "11:30:00"),
            entry("trip-b", (52.3000, 21.1000), "12:30:00"),
        ]
    }

    fn wall_clock(h: u32, m: u32, s: u32) -> ClockTime {
        ClockTime::from_instant(&Utc.with_ymd_and_hms(2024, 5, 6, h, m, s).unwrap())
    }

    fn vehicle_at(lat: f64, lon: f64) -> Vehicle {
        let mut entry = api_entry();
        entry.lat = lat;
        entry.lon = lon;
        Vehicle::from_api(&entry).unwrap()
    }

    #[test]
    fn from_api_builds_id_and_times() {
        let v = Vehicle::from_api(&api_entry()).unwrap();
        assert_eq!(v.id, "V/100/1");
        assert_eq!(v.time, "2024-05-06T11:45:00");
        assert!(v.trip.is_empty());
        assert_eq!(v.bearing, 0.0);
    }

    #[test]
    fn bad_report_time_is_fatal() {
        let mut entry = api_entry();
        entry.time = "today 11:45".to_string();
        assert!(matches!(Vehicle::from_api(&entry), Err(Error::InvalidTime(_))));
    }

    #[test]
    fn empty_duty_leaves_vehicle_inactive() {
        let mut v = vehicle_at(52.23, 21.01);
        v.match_trip(None, &wall_clock(11, 45, 0), &[]).unwrap();
        assert!(v.trip.is_empty());
    }

    #[test]
    fn no_prev_picks_first_trip_ending_in_the_future() {
        // Wall clock 11:45: trip-a ended 11:30, trip-b ends 12:30.
        let mut v = vehicle_at(52.23, 21.01);
        v.match_trip(None, &wall_clock(11, 45, 0), &duty()).unwrap();
        assert_eq!(v.trip, "trip-b");
    }

    #[test]
    fn no_prev_falls_back_to_last_trip_after_day_end() {
        let mut v = vehicle_at(52.23, 21.01);
        v.match_trip(None, &wall_clock(13, 0, 0), &duty()).unwrap();
        assert_eq!(v.trip, "trip-b");
    }

    #[test]
    fn advances_near_terminus_and_end_time() {
        // 30 seconds before trip-a's end, within 30 m of its terminal.
        let mut prev = vehicle_at(52.1999, 21.0000);
        prev.trip = "trip-a".to_string();

        let mut v = vehicle_at(52.2001, 21.0000);
        v.match_trip(Some(&prev), &wall_clock(11, 29, 30), &duty())
            .unwrap();
        assert_eq!(v.trip, "trip-b");
    }

    #[test]
    fn keeps_trip_far_from_terminus() {
        let mut prev = vehicle_at(52.2500, 21.0500);
        prev.trip = "trip-a".to_string();

        let mut v = vehicle_at(52.2500, 21.0500);
        v.match_trip(Some(&prev), &wall_clock(11, 29, 30), &duty())
            .unwrap();
        assert_eq!(v.trip, "trip-a");
    }

    #[test]
    fn fail_safe_advances_forgotten_trips() {
        // 40 minutes past trip-a's end, far from its terminal.
        let mut prev = vehicle_at(52.2500, 21.0500);
        prev.trip = "trip-a".to_string();

        let mut v = vehicle_at(52.2500, 21.0500);
        v.match_trip(Some(&prev), &wall_clock(12, 10, 0), &duty())
            .unwrap();
        assert_eq!(v.trip, "trip-b");
    }

    #[test]
    fn last_trip_is_kept_without_any_checks() {
        let mut prev = vehicle_at(52.30, 21.10);
        prev.trip = "trip-b".to_string();

        let mut v = vehicle_at(52.30, 21.10);
        v.match_trip(Some(&prev), &wall_clock(12, 29, 0), &duty())
            .unwrap();
        assert_eq!(v.trip, "trip-b");
    }

    #[test]
    fn unknown_previous_trip_restarts_matching() {
        let mut prev = vehicle_at(52.23, 21.01);
        prev.trip = "trip-gone".to_string();

        let mut v = vehicle_at(52.23, 21.01);
        v.match_trip(Some(&prev), &wall_clock(11, 45, 0), &duty())
            .unwrap();
        assert_eq!(v.trip, "trip-b");
    }

    #[test]
    fn bearing_held_under_twenty_meters() {
        let mut prev = vehicle_at(52.2300, 21.0100);
        prev.bearing = 90.0;

        let mut v = vehicle_at(52.2300, 21.0101);
        v.update_bearing(Some(&prev));
        assert_eq!(v.bearing, 90.0);
        assert!(geo::haversine(prev.lat, prev.lon, v.lat, v.lon) < 0.02);
    }

    #[test]
    fn bearing_recomputed_after_real_movement() {
        let mut prev = vehicle_at(52.2300, 21.0100);
        prev.bearing = 90.0;

        // ~1.1 km due north.
        let mut v = vehicle_at(52.2400, 21.0100);
        v.update_bearing(Some(&prev));
        assert!(v.bearing.abs() < 1e-6, "bearing was {}", v.bearing);
    }

    #[test]
    fn no_previous_record_leaves_bearing_zero() {
        let mut v = vehicle_at(52.23, 21.01);
        v.update_bearing(None);
        assert_eq!(v.bearing, 0.0);
    }

    #[test]
    fn entity_carries_trip_label_and_position() {
        let mut v = vehicle_at(52.2300, 21.0100);
        v.trip = "trip-b".to_string();
        v.bearing = 45.0;

        let entity = v.as_entity();
        assert_eq!(entity.id, "V/100/1");
        let pos = entity.vehicle.unwrap();
        assert_eq!(pos.trip.unwrap().trip_id.as_deref(), Some("trip-b"));
        let descriptor = pos.vehicle.unwrap();
        assert_eq!(descriptor.label.as_deref(), Some("1234"));
        let position = pos.position.unwrap();
        assert!((position.latitude - 52.23).abs() < 1e-4);
        assert_eq!(position.bearing, Some(45.0));
        assert_eq!(pos.timestamp, Some(1714995900));
    }
}
