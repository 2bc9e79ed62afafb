//! The brigade index: for every `V/<route>/<brigade>` duty, the ordered
//! sequence of trip terminals a physical vehicle works through during one
//! service day.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::gtfs::time::ClockTime;
use crate::gtfs::GtfsIndex;

pub type BrigadeMap = HashMap<String, Vec<BrigadeEntry>>;

/// One trip terminal within a brigade's duty.
#[derive(Debug, Clone)]
pub struct BrigadeEntry {
    pub trip_id: String,
    pub last_stop_pos: (f64, f64),
    pub last_stop_timepoint: String,
    pub last_stop_time: ClockTime,
}

/// Builds the brigade index from a loaded GTFS snapshot. Trips of inactive
/// services and trips that never saw a stop-time are skipped. Entries are
/// sorted by timepoint string; zero-padded `HH:MM:SS` compares
/// chronologically even past 24 h.
pub fn build(index: &GtfsIndex) -> Result<BrigadeMap> {
    let mut brigades = BrigadeMap::new();

    for (trip_id, trip) in &index.trips {
        if !index.services.contains(&trip.service) {
            continue;
        }
        let Some(last_stop) = &trip.last_stop else {
            continue;
        };

        let last_stop_time = ClockTime::from_schedule(&last_stop.timepoint).map_err(|_| {
            Error::InvalidField {
                file: "stop_times.txt",
                field: "departure_time",
                value: last_stop.timepoint.clone(),
            }
        })?;

        let key = format!("V/{}/{}", trip.route, trip.brigade);
        brigades.entry(key).or_default().push(BrigadeEntry {
            trip_id: trip_id.clone(),
            last_stop_pos: index.stops.get(&last_stop.stop_id).copied().unwrap_or_default(),
            last_stop_timepoint: last_stop.timepoint.clone(),
            last_stop_time,
        });
    }

    for entries in brigades.values_mut() {
        entries.sort_by(|a, b| a.last_stop_timepoint.cmp(&b.last_stop_timepoint));
    }
    Ok(brigades)
}
