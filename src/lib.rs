pub mod alerts;
pub mod error;
pub mod fetch;
pub mod gtfs;
pub mod positions;
pub mod resource;
pub mod rt;
pub mod supervisor;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
