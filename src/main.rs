//! CLI entry point for the Warsaw GTFS-Realtime producer.
//!
//! Exactly one of `-a` (service alerts) or `-p` (vehicle positions) must be
//! selected. By default the chosen feed is produced once; with `--loop` the
//! process keeps updating it, re-reading the static GTFS only when the
//! upstream actually changed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use warsaw_rt::alerts;
use warsaw_rt::error::Error;
use warsaw_rt::fetch::{BasicClient, ExclusiveClient};
use warsaw_rt::gtfs::GtfsStatic;
use warsaw_rt::positions::{self, api::VehicleApi, brigades, VehicleMap};
use warsaw_rt::resource;
use warsaw_rt::supervisor::{self, AlertsPipeline, PositionsPipeline};

/// Download budget for the static archive in one-shot mode.
const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "warsaw-rt")]
#[command(about = "Produces GTFS-Realtime feeds for the Warsaw transit network", long_about = None)]
struct Cli {
    /// Create the GTFS-Realtime service alerts feed
    #[arg(short = 'a', long = "alerts")]
    alerts: bool,

    /// Create the GTFS-Realtime vehicle positions feed
    #[arg(short = 'p', long = "positions")]
    positions: bool,

    /// Apikey for api.um.warszawa.pl (positions); falls back to the
    /// WARSAW_APIKEY environment variable
    #[arg(short = 'k', long = "key")]
    apikey: Option<String>,

    /// Path or URL of the static Warsaw GTFS archive
    #[arg(long = "gtfs-file", default_value = "https://mkuran.pl/gtfs/warsaw.zip")]
    gtfs_file: String,

    /// Target folder for the created GTFS-Realtime files
    #[arg(long, default_value = "data_rt")]
    target: PathBuf,

    /// Also save JSON files alongside the GTFS-Realtime feeds
    #[arg(long)]
    json: bool,

    /// Use a human-readable dump instead of the binary protobuf format
    #[arg(long)]
    readable: bool,

    /// Make scrape and API anomalies fatal instead of warnings
    #[arg(long)]
    strict: bool,

    /// Update the output every SECONDS instead of running once
    #[arg(long = "loop", value_name = "SECONDS", default_value_t = 0)]
    loop_every: u64,

    /// Minimum seconds between checks whether the static GTFS changed
    #[arg(long = "checkdata", value_name = "SECONDS", default_value_t = 1800)]
    check_data: u64,
}

impl Cli {
    fn alert_options(&self) -> alerts::Options {
        alerts::Options {
            gtfs_rt_target: self.target.join("alerts.pb"),
            json_target: self.json.then(|| self.target.join("alerts.json")),
            human_readable: self.readable,
            strict: self.strict,
        }
    }

    fn position_options(&self) -> positions::Options {
        positions::Options {
            gtfs_rt_target: self.target.join("positions.pb"),
            json_target: self.json.then(|| self.target.join("positions.json")),
            human_readable: self.readable,
        }
    }

    fn apikey(&self) -> Result<String, Error> {
        self.apikey
            .clone()
            .or_else(|| std::env::var("WARSAW_APIKEY").ok())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "a key for api.um.warszawa.pl needs to be provided (-k or WARSAW_APIKEY)"
                        .to_string(),
                )
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    if cli.alerts == cli.positions {
        return Err(Error::Config(
            "exactly one of the -a or -p flags has to be provided".to_string(),
        )
        .into());
    }

    std::fs::create_dir_all(&cli.target)
        .with_context(|| format!("creating target directory {}", cli.target.display()))?;

    let loop_period = (cli.loop_every > 0).then(|| Duration::from_secs(cli.loop_every));
    match (cli.alerts, loop_period) {
        (true, None) => single_alerts(&cli).await,
        (true, Some(period)) => loop_alerts(&cli, period).await,
        (false, None) => single_positions(&cli).await,
        (false, Some(period)) => loop_positions(&cli, period).await,
    }
}

/// Loads the static archive from a path or URL (one-shot mode).
async fn load_static(source: &str) -> Result<GtfsStatic> {
    info!("retrieving the static GTFS");
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = BasicClient::with_request_timeout(ARCHIVE_TIMEOUT);
        Ok(GtfsStatic::from_url(&client, source).await?)
    } else {
        Ok(GtfsStatic::from_path(source)?)
    }
}

async fn single_alerts(cli: &Cli) -> Result<()> {
    let opts = cli.alert_options();

    let source = load_static(&cli.gtfs_file).await?;
    info!("loading routes.txt");
    let routes = tokio::task::spawn_blocking(move || source.load_routes()).await??;

    info!("creating alerts");
    let client = Arc::new(ExclusiveClient::new(BasicClient::new()));
    alerts::make(client, Arc::new(routes), &opts).await?;
    Ok(())
}

async fn single_positions(cli: &Cli) -> Result<()> {
    let opts = cli.position_options();
    let api = VehicleApi::new(cli.apikey()?, BasicClient::new());

    let source = load_static(&cli.gtfs_file).await?;
    info!("loading the static GTFS tables");
    let index = source.load_all().await?;
    let brigades = brigades::build(&index)?;

    info!("creating positions");
    positions::create(&api, &brigades, &VehicleMap::new(), &opts).await?;
    Ok(())
}

async fn loop_alerts(cli: &Cli, period: Duration) -> Result<()> {
    let opts = cli.alert_options();
    let resource = gtfs_resource(cli);
    let client = Arc::new(ExclusiveClient::new(BasicClient::new()));

    let mut pipeline = AlertsPipeline::new(client, opts);
    supervisor::run_loop(resource, period, &mut pipeline).await?;
    Ok(())
}

async fn loop_positions(cli: &Cli, period: Duration) -> Result<()> {
    let opts = cli.position_options();
    let resource = gtfs_resource(cli);
    let api = VehicleApi::new(cli.apikey()?, BasicClient::new());

    let mut pipeline = PositionsPipeline::new(api, opts);
    supervisor::run_loop(resource, period, &mut pipeline).await?;
    Ok(())
}

fn gtfs_resource(cli: &Cli) -> Box<dyn resource::Resource> {
    resource::for_source(&cli.gtfs_file, Duration::from_secs(cli.check_data))
}
