//! The vehicle-positions pipeline: poll the municipal API, match every
//! vehicle to a scheduled trip using the brigade index and the previous
//! iteration's records, compute bearings, and encode the survivors.

pub mod api;
pub mod brigades;
pub mod geo;
pub mod vehicle;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use chrono_tz::Europe::Warsaw;
use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::fetch::HttpClient;
use crate::gtfs::time::ClockTime;
use crate::gtfs_rt::FeedMessage;
use crate::rt;
use api::{ApiVehicle, VehicleApi};
use brigades::BrigadeMap;
use vehicle::Vehicle;

/// Options for one positions pass.
#[derive(Debug, Clone)]
pub struct Options {
    pub gtfs_rt_target: PathBuf,
    pub json_target: Option<PathBuf>,
    pub human_readable: bool,
}

/// The previous iteration's matched vehicles, keyed by vehicle id. Only
/// this map survives iteration boundaries.
pub type VehicleMap = BTreeMap<String, Vehicle>;

/// All vehicles of one pass. A `BTreeMap` keeps the output entity order
/// deterministic for a given API snapshot.
pub struct VehicleContainer {
    pub synced_at: DateTime<Utc>,
    pub compare_now: ClockTime,
    pub vehicles: VehicleMap,
}

impl VehicleContainer {
    pub fn new(synced_at: DateTime<Utc>) -> VehicleContainer {
        VehicleContainer {
            synced_at,
            compare_now: ClockTime::from_instant(&synced_at.with_timezone(&Warsaw)),
            vehicles: VehicleMap::new(),
        }
    }

    /// Creates vehicle records from API entries. A duplicate id keeps the
    /// later entry.
    pub fn prepare(&mut self, entries: &[ApiVehicle]) -> Result<()> {
        self.vehicles = VehicleMap::new();
        for entry in entries {
            let vehicle = Vehicle::from_api(entry)?;
            self.vehicles.insert(vehicle.id.clone(), vehicle);
        }
        Ok(())
    }

    /// Matches every vehicle to a trip and computes bearings. Vehicles that
    /// end up without a trip (inactive duties) are dropped.
    pub fn match_all(&mut self, brigades: &BrigadeMap, prev: &VehicleMap) -> Result<()> {
        static NO_DUTY: Vec<brigades::BrigadeEntry> = Vec::new();

        let now = self.compare_now;
        for (id, vehicle) in self.vehicles.iter_mut() {
            let duty = brigades.get(id).unwrap_or(&NO_DUTY);
            let previous = prev.get(id);

            vehicle.match_trip(previous, &now, duty)?;
            if !vehicle.trip.is_empty() {
                vehicle.update_bearing(previous);
            }
        }

        self.vehicles.retain(|_, vehicle| !vehicle.trip.is_empty());
        Ok(())
    }

    pub fn as_feed_message(&self) -> FeedMessage {
        let mut message = rt::feed_message(self.synced_at);
        message.entity = self.vehicles.values().map(Vehicle::as_entity).collect();
        message
    }

    pub fn save_json(&self, target: &std::path::Path) -> Result<()> {
        #[derive(Serialize)]
        struct Document<'a> {
            time: String,
            positions: Vec<&'a Vehicle>,
        }

        let doc = Document {
            time: self.synced_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            positions: self.vehicles.values().collect(),
        };
        rt::write_atomic(target, &serde_json::to_vec_pretty(&doc)?)
    }

    pub fn save_pb(&self, target: &std::path::Path, human_readable: bool) -> Result<()> {
        rt::write_feed(target, &self.as_feed_message(), human_readable)
    }
}

/// Runs one positions pass and returns the matched vehicles, which become
/// the next pass's `prev` map.
pub async fn create<C: HttpClient>(
    api: &VehicleApi<C>,
    brigades: &BrigadeMap,
    prev: &VehicleMap,
    opts: &Options,
) -> Result<VehicleMap> {
    let mut container = VehicleContainer::new(Utc::now());

    let entries = api.get_all().await?;
    info!("API returned {} vehicles", entries.len());

    container.prepare(&entries)?;
    container.match_all(brigades, prev)?;
    info!("matched {} vehicles to trips", container.vehicles.len());

    if let Some(json_target) = &opts.json_target {
        container.save_json(json_target)?;
    }
    container.save_pb(&opts.gtfs_rt_target, opts.human_readable)?;

    Ok(container.vehicles)
}
