//! Static GTFS ingestion.
//!
//! [`GtfsStatic`] owns the zip archive (downloaded archives live in a
//! temporary file, since the zip format needs random access) and knows the
//! reference service date. The per-table loaders each open their own handle
//! on the archive, which lets [`GtfsStatic::load_all`] run the independent
//! tables on parallel blocking workers.

pub mod time;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Europe::Warsaw;
use futures::StreamExt;
use log::info;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::fetch::{self, HttpClient};

/// `route_type` → sorted route ids, e.g. `"0"` (tram) → `["4", "33", ...]`.
pub type RouteMap = HashMap<String, Vec<String>>;

/// One worker per independent table, plus one slack slot.
const ERROR_CHANNEL_CAPACITY: usize = 5;

/// The terminal stop event of a trip: the stop-times row with the greatest
/// `stop_sequence` seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct LastStop {
    pub stop_id: String,
    pub timepoint: String,
    pub sequence: u32,
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub route: String,
    pub service: String,
    pub brigade: String,
    pub last_stop: Option<LastStop>,
}

/// The in-memory snapshot built from one archive. Read-only once loaded;
/// the supervisor replaces the whole snapshot when the upstream changes.
#[derive(Debug)]
pub struct GtfsIndex {
    pub routes: RouteMap,
    pub stops: HashMap<String, (f64, f64)>,
    pub services: HashSet<String>,
    pub trips: HashMap<String, Trip>,
}

/// Whether `candidate` appears in any route-type bucket.
pub fn any_bucket_contains(routes: &RouteMap, candidate: &str) -> bool {
    routes
        .values()
        .any(|bucket| bucket.binary_search_by(|r| r.as_str().cmp(candidate)).is_ok())
}

/// A static GTFS archive plus its load-time metadata.
pub struct GtfsStatic {
    path: PathBuf,
    // Keeps a downloaded archive alive (and deletes it on drop).
    _temp: Option<NamedTempFile>,
    pub synced_at: DateTime<Utc>,
    /// `YYYYMMDD` in Warsaw local time, shifted back one day before 03:00.
    pub service_date: String,
}

impl GtfsStatic {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let source = Self::new(path.into(), None);
        source.open_archive()?;
        Ok(source)
    }

    /// Builds a source from in-memory archive bytes (the loop-mode refresh
    /// path) by spilling them to a temporary file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let temp = NamedTempFile::new()?;
        std::fs::write(temp.path(), data)?;
        let source = Self::new(temp.path().to_path_buf(), Some(temp));
        source.open_archive()?;
        Ok(source)
    }

    /// Streams the archive from a URL into a temporary file.
    pub async fn from_url<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Self> {
        let resp = fetch::get_checked(client, url).await?;

        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::create(temp.path()).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        let source = Self::new(temp.path().to_path_buf(), Some(temp));
        source.open_archive()?;
        Ok(source)
    }

    fn new(path: PathBuf, temp: Option<NamedTempFile>) -> Self {
        let synced_at = Utc::now();
        Self {
            path,
            _temp: temp,
            synced_at,
            service_date: service_date_for(synced_at),
        }
    }

    fn open_archive(&self) -> Result<ZipArchive<File>> {
        open_archive_at(&self.path)
    }

    /// Loads `routes.txt` only — all the alerts pipeline needs.
    pub fn load_routes(&self) -> Result<RouteMap> {
        parse_routes(&mut self.open_archive()?)
    }

    pub fn load_stops(&self) -> Result<HashMap<String, (f64, f64)>> {
        parse_stops(&mut self.open_archive()?)
    }

    pub fn load_services(&self) -> Result<HashSet<String>> {
        parse_services(&mut self.open_archive()?, &self.service_date)
    }

    pub fn load_trips(&self) -> Result<HashMap<String, Trip>> {
        parse_trips(&mut self.open_archive()?)
    }

    /// Loads every table. Routes, stops, services and trips are independent
    /// and run on four blocking workers; failures land in a bounded channel
    /// that is inspected once all workers have finished. Stop-times runs
    /// last because each of its rows updates a trip record.
    pub async fn load_all(&self) -> Result<GtfsIndex> {
        let (tx, rx) = mpsc::sync_channel::<Error>(ERROR_CHANNEL_CAPACITY);

        let routes = spawn_table_map(&self.path, parse_routes, tx.clone());
        let stops = spawn_table_map(&self.path, parse_stops, tx.clone());
        let trips = spawn_table_map(&self.path, parse_trips, tx.clone());
        let services = {
            let path = self.path.clone();
            let date = self.service_date.clone();
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                match open_archive_at(&path).and_then(|mut ar| parse_services(&mut ar, &date)) {
                    Ok(table) => Some(table),
                    Err(err) => {
                        let _ = tx.try_send(err);
                        None
                    }
                }
            })
        };

        let (routes, stops, trips, services) = tokio::join!(routes, stops, trips, services);
        drop(tx);

        if let Some(err) = rx.try_iter().next() {
            return Err(err);
        }
        let routes = routes?.expect("worker failed without reporting an error");
        let stops = stops?.expect("worker failed without reporting an error");
        let mut trips = trips?.expect("worker failed without reporting an error");
        let services = services?.expect("worker failed without reporting an error");

        let trips = {
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || -> Result<_> {
                parse_stop_times(&mut open_archive_at(&path)?, &mut trips)?;
                Ok(trips)
            })
            .await??
        };

        info!(
            "loaded GTFS: {} route buckets, {} stops, {} active services, {} trips",
            routes.len(),
            stops.len(),
            services.len(),
            trips.len()
        );
        Ok(GtfsIndex {
            routes,
            stops,
            services,
            trips,
        })
    }
}

fn spawn_table_map<T: Send + 'static>(
    path: &Path,
    run: fn(&mut ZipArchive<File>) -> Result<T>,
    tx: mpsc::SyncSender<Error>,
) -> tokio::task::JoinHandle<Option<T>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || match load_table(&path, run) {
        Ok(table) => Some(table),
        Err(err) => {
            let _ = tx.try_send(err);
            None
        }
    })
}

fn load_table<T>(path: &Path, run: fn(&mut ZipArchive<File>) -> Result<T>) -> Result<T> {
    let mut archive = open_archive_at(path)?;
    run(&mut archive)
}

fn open_archive_at(path: &Path) -> Result<ZipArchive<File>> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// The Warsaw service day runs until 03:00 the next morning.
fn service_date_for(instant: DateTime<Utc>) -> String {
    let local = instant.with_timezone(&Warsaw);
    let mut date = local.date_naive();
    if local.hour() < 3 {
        date = date.pred_opt().unwrap_or(date);
    }
    date.format("%Y%m%d").to_string()
}

fn table_reader<'a>(
    archive: &'a mut ZipArchive<File>,
    name: &'static str,
) -> Result<csv::Reader<impl std::io::Read + 'a>> {
    let file = archive.by_name(name).map_err(|err| match err {
        ZipError::FileNotFound => Error::MissingFile(name),
        other => Error::Zip(other),
    })?;
    Ok(csv::Reader::from_reader(file))
}

fn column(
    headers: &csv::StringRecord,
    file: &'static str,
    name: &'static str,
) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or(Error::MissingColumn { file, column: name })
}

fn parse_routes(archive: &mut ZipArchive<File>) -> Result<RouteMap> {
    let mut reader = table_reader(archive, "routes.txt")?;
    let headers = reader.headers()?.clone();
    let idx_type = column(&headers, "routes.txt", "route_type")?;
    let idx_id = column(&headers, "routes.txt", "route_id")?;

    let mut routes = RouteMap::new();
    for record in reader.records() {
        let record = record?;
        let route_type = record.get(idx_type).unwrap_or_default();
        let route_id = record.get(idx_id).unwrap_or_default();

        let bucket = routes.entry(route_type.to_string()).or_default();
        if let Err(pos) = bucket.binary_search_by(|r| r.as_str().cmp(route_id)) {
            bucket.insert(pos, route_id.to_string());
        }
    }
    Ok(routes)
}

fn parse_stops(archive: &mut ZipArchive<File>) -> Result<HashMap<String, (f64, f64)>> {
    let mut reader = table_reader(archive, "stops.txt")?;
    let headers = reader.headers()?.clone();
    let idx_id = column(&headers, "stops.txt", "stop_id")?;
    let idx_lat = column(&headers, "stops.txt", "stop_lat")?;
    let idx_lon = column(&headers, "stops.txt", "stop_lon")?;

    let parse = |record: &csv::StringRecord, idx: usize, field: &'static str| -> Result<f64> {
        let raw = record.get(idx).unwrap_or_default();
        raw.parse().map_err(|_| Error::InvalidField {
            file: "stops.txt",
            field,
            value: raw.to_string(),
        })
    };

    let mut stops = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let lat = parse(&record, idx_lat, "stop_lat")?;
        let lon = parse(&record, idx_lon, "stop_lon")?;
        stops.insert(record.get(idx_id).unwrap_or_default().to_string(), (lat, lon));
    }
    Ok(stops)
}

fn parse_services(
    archive: &mut ZipArchive<File>,
    service_date: &str,
) -> Result<HashSet<String>> {
    let mut reader = table_reader(archive, "calendar_dates.txt")?;
    let headers = reader.headers()?.clone();
    let idx_id = column(&headers, "calendar_dates.txt", "service_id")?;
    let idx_date = column(&headers, "calendar_dates.txt", "date")?;

    let mut services = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if record.get(idx_date).unwrap_or_default() == service_date {
            services.insert(record.get(idx_id).unwrap_or_default().to_string());
        }
    }
    Ok(services)
}

fn parse_trips(archive: &mut ZipArchive<File>) -> Result<HashMap<String, Trip>> {
    let mut reader = table_reader(archive, "trips.txt")?;
    let headers = reader.headers()?.clone();
    let idx_trip = column(&headers, "trips.txt", "trip_id")?;
    let idx_route = column(&headers, "trips.txt", "route_id")?;
    let idx_service = column(&headers, "trips.txt", "service_id")?;
    let idx_brigade = column(&headers, "trips.txt", "block_short_name")?;

    let mut trips = HashMap::new();
    for record in reader.records() {
        let record = record?;
        trips.insert(
            record.get(idx_trip).unwrap_or_default().to_string(),
            Trip {
                route: record.get(idx_route).unwrap_or_default().to_string(),
                service: record.get(idx_service).unwrap_or_default().to_string(),
                brigade: record.get(idx_brigade).unwrap_or_default().to_string(),
                last_stop: None,
            },
        );
    }
    Ok(trips)
}

/// Must run after [`parse_trips`]: every row updates its owning trip.
/// Rows referencing an undefined trip are skipped, not an error.
fn parse_stop_times(
    archive: &mut ZipArchive<File>,
    trips: &mut HashMap<String, Trip>,
) -> Result<()> {
    let mut reader = table_reader(archive, "stop_times.txt")?;
    let headers = reader.headers()?.clone();
    let idx_trip = column(&headers, "stop_times.txt", "trip_id")?;
    let idx_stop = column(&headers, "stop_times.txt", "stop_id")?;
    let idx_seq = column(&headers, "stop_times.txt", "stop_sequence")?;
    let idx_dep = column(&headers, "stop_times.txt", "departure_time")?;

    for record in reader.records() {
        let record = record?;

        let raw_seq = record.get(idx_seq).unwrap_or_default();
        let sequence: u32 = raw_seq.parse().map_err(|_| Error::InvalidField {
            file: "stop_times.txt",
            field: "stop_sequence",
            value: raw_seq.to_string(),
        })?;

        let timepoint = record.get(idx_dep).unwrap_or_default();
        if timepoint.is_empty() {
            return Err(Error::InvalidField {
                file: "stop_times.txt",
                field: "departure_time",
                value: String::new(),
            });
        }

        let Some(trip) = trips.get_mut(record.get(idx_trip).unwrap_or_default()) else {
            continue;
        };

        // Strictly greater: a row with an equal sequence does not overwrite.
        let replace = trip
            .last_stop
            .as_ref()
            .is_none_or(|last| sequence > last.sequence);
        if replace {
            trip.last_stop = Some(LastStop {
                stop_id: record.get(idx_stop).unwrap_or_default().to_string(),
                timepoint: timepoint.to_string(),
                sequence,
            });
        }
    }
    Ok(())
}
