//! Loop-mode supervision: refresh the static input only when it changed,
//! run the pass under exponential backoff, sleep, repeat.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Local;
use log::{info, warn};

use crate::alerts;
use crate::error::Result;
use crate::fetch::HttpClient;
use crate::gtfs::{GtfsStatic, RouteMap};
use crate::positions::{self, api::VehicleApi, brigades, brigades::BrigadeMap, VehicleMap};
use crate::resource::Resource;

/// One feed-producing pipeline, as the supervisor sees it.
#[async_trait]
pub trait Pipeline: Send {
    fn name(&self) -> &'static str;

    /// Whether the static data is loaded at all.
    fn has_data(&self) -> bool;

    /// Rebuilds the static snapshot from freshly fetched archive bytes.
    async fn reload(&mut self, archive: Vec<u8>) -> Result<()>;

    /// Runs one pass.
    async fn run_once(&mut self) -> Result<()>;
}

/// The retry policy for failed passes: 10 s doubling to at most 48 h, 30 %
/// jitter, giving up after 48 h of consecutive failures.
fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(10),
        randomization_factor: 0.3,
        multiplier: 2.0,
        max_interval: Duration::from_secs(48 * 3600),
        max_elapsed_time: Some(Duration::from_secs(48 * 3600)),
        ..ExponentialBackoff::default()
    }
}

/// Drives a pipeline forever (or until a fatal error).
///
/// Resource check/fetch and reload errors are fatal: a loop that cannot
/// see its static input is misconfigured. Pass failures back off
/// exponentially; only an exhausted backoff budget propagates.
pub async fn run_loop<P: Pipeline>(
    mut resource: Box<dyn Resource>,
    period: Duration,
    pipeline: &mut P,
) -> Result<()> {
    let mut policy = retry_policy();

    loop {
        if resource.check().await? || !pipeline.has_data() {
            info!("GTFS has changed, reloading static data");
            let archive = resource.fetch().await?;
            pipeline.reload(archive).await?;
        }

        policy.reset();
        loop {
            match pipeline.run_once().await {
                Ok(()) => {
                    info!("GTFS-RT {} updated successfully", pipeline.name());
                    break;
                }
                Err(err) => match policy.next_backoff() {
                    Some(sleep) => {
                        let until = Local::now()
                            + chrono::Duration::from_std(sleep)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                        warn!(
                            "updating GTFS-RT {} failed, backing off until {}: {err}",
                            pipeline.name(),
                            until.format("%H:%M:%S"),
                        );
                        tokio::time::sleep(sleep).await;
                    }
                    None => return Err(err),
                },
            }
        }

        tokio::time::sleep(period).await;
    }
}

/// The alerts pipeline: needs only the route table from the static feed.
pub struct AlertsPipeline<C> {
    client: Arc<C>,
    routes: Option<Arc<RouteMap>>,
    opts: alerts::Options,
}

impl<C: HttpClient + Send + Sync + 'static> AlertsPipeline<C> {
    pub fn new(client: Arc<C>, opts: alerts::Options) -> Self {
        Self {
            client,
            routes: None,
            opts,
        }
    }
}

#[async_trait]
impl<C: HttpClient + Send + Sync + 'static> Pipeline for AlertsPipeline<C> {
    fn name(&self) -> &'static str {
        "alerts"
    }

    fn has_data(&self) -> bool {
        self.routes.is_some()
    }

    async fn reload(&mut self, archive: Vec<u8>) -> Result<()> {
        let routes = tokio::task::spawn_blocking(move || -> Result<RouteMap> {
            GtfsStatic::from_bytes(&archive)?.load_routes()
        })
        .await??;
        self.routes = Some(Arc::new(routes));
        Ok(())
    }

    async fn run_once(&mut self) -> Result<()> {
        let routes = self
            .routes
            .clone()
            .expect("run_once called before reload");
        alerts::make(Arc::clone(&self.client), routes, &self.opts).await
    }
}

/// The positions pipeline: needs the full static index, condensed into the
/// brigade map, and carries the previous iteration's vehicles.
pub struct PositionsPipeline<C> {
    api: VehicleApi<C>,
    brigades: Option<BrigadeMap>,
    prev: VehicleMap,
    opts: positions::Options,
}

impl<C: HttpClient> PositionsPipeline<C> {
    pub fn new(api: VehicleApi<C>, opts: positions::Options) -> Self {
        Self {
            api,
            brigades: None,
            prev: VehicleMap::new(),
            opts,
        }
    }
}

#[async_trait]
impl<C: HttpClient + Send + Sync> Pipeline for PositionsPipeline<C> {
    fn name(&self) -> &'static str {
        "positions"
    }

    fn has_data(&self) -> bool {
        self.brigades.is_some()
    }

    async fn reload(&mut self, archive: Vec<u8>) -> Result<()> {
        let source =
            tokio::task::spawn_blocking(move || GtfsStatic::from_bytes(&archive)).await??;
        let index = source.load_all().await?;
        self.brigades = Some(brigades::build(&index)?);
        Ok(())
    }

    async fn run_once(&mut self) -> Result<()> {
        let brigades = self
            .brigades
            .as_ref()
            .expect("run_once called before reload");
        self.prev = positions::create(&self.api, brigades, &self.prev, &self.opts).await?;
        Ok(())
    }
}
