//! The service-alerts pipeline: two RSS channels are scraped into alert
//! records, every record's detail page is fetched (politely — one request
//! at a time to the alerts host) to find affected routes and the alert
//! body, and the surviving records are encoded as a GTFS-Realtime feed.

pub mod html;
pub mod plaintext;
pub mod rss;

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use log::{info, warn};
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use tokio::task::JoinSet;
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::{self, HttpClient};
use crate::gtfs::{any_bucket_contains, RouteMap};
use crate::gtfs_rt::{alert, Alert as RtAlert, EntitySelector, FeedEntity, FeedMessage};
use crate::rt;
use rss::RssItem;

pub const URL_IMPEDIMENTS: &str = "https://www.wtp.waw.pl/feed/?post_type=impediment";
pub const URL_CHANGES: &str = "https://www.wtp.waw.pl/feed/?post_type=change";

/// Hosts a detail link may point to; anything else is a scrape error.
const EXPECTED_HOSTS: [&str; 2] = ["www.wtp.waw.pl", "wtp.waw.pl"];

static ALERT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&p=(\d+)").expect("alert id regex"));
static ROUTE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Za-z-]{1,3}").expect("route token regex"));

/// Options for one alerts pass.
#[derive(Debug, Clone)]
pub struct Options {
    pub gtfs_rt_target: PathBuf,
    pub json_target: Option<PathBuf>,
    pub human_readable: bool,
    /// Elevate detail-page scrape errors from warnings to a failed pass.
    pub strict: bool,
}

/// Which GTFS-Realtime effect an alert carries, derived from the feed it
/// came from: impediments reduce service, changes are "other".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
    ReducedService,
    #[default]
    OtherEffect,
}

impl Effect {
    fn id_prefix(self) -> &'static str {
        match self {
            Effect::ReducedService => "A/IMPEDIMENT/",
            Effect::OtherEffect => "A/CHANGE/",
        }
    }

    fn as_proto(self) -> alert::Effect {
        match self {
            Effect::ReducedService => alert::Effect::ReducedService,
            Effect::OtherEffect => alert::Effect::OtherEffect,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub routes: Vec<String>,
    pub effect: Effect,
    pub link: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "htmlbody")]
    pub html_body: String,
}

impl Alert {
    /// Builds an alert stub from an RSS item: id from the `&p=<digits>`
    /// group in the GUID, title and link put through the strict sanitizer,
    /// and routes seeded from the part of the item title after the colon.
    pub fn from_rss_item(item: &RssItem, routes: &RouteMap) -> Result<Alert> {
        let id_digits = ALERT_ID_RE
            .captures(&item.guid)
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| Error::AlertId(item.guid.clone()))?;

        let mut alert = Alert {
            id: format!("{}{}", item.effect.id_prefix(), id_digits.as_str()),
            routes: Vec::new(),
            effect: item.effect,
            link: html::strip_markup(&item.link),
            title: html::strip_markup(&item.description),
            body: String::new(),
            html_body: String::new(),
        };

        if let Some((_, listed)) = item.title.split_once(':') {
            for token in ROUTE_TOKEN_RE.find_iter(listed) {
                if any_bucket_contains(routes, token.as_str()) {
                    alert.routes.push(token.as_str().to_string());
                }
            }
        }

        Ok(alert)
    }

    fn as_entity(&self) -> FeedEntity {
        FeedEntity {
            id: self.id.clone(),
            is_deleted: None,
            vehicle: None,
            alert: Some(RtAlert {
                active_period: Vec::new(),
                informed_entity: self
                    .routes
                    .iter()
                    .map(|route| EntitySelector {
                        route_id: Some(route.clone()),
                        ..Default::default()
                    })
                    .collect(),
                cause: None,
                effect: Some(self.effect.as_proto() as i32),
                url: Some(rt::translated(&self.link)),
                header_text: Some(rt::translated(&self.title)),
                description_text: Some(rt::translated(&self.body)),
            }),
        }
    }
}

/// All alerts of one pass plus the pass timestamp.
pub struct AlertContainer {
    pub timestamp: DateTime<Utc>,
    pub alerts: Vec<Alert>,
}

impl AlertContainer {
    pub fn as_feed_message(&self) -> FeedMessage {
        let mut message = rt::feed_message(self.timestamp);
        message.entity = self.alerts.iter().map(Alert::as_entity).collect();
        message
    }

    /// Drops alerts that never acquired a route list.
    pub fn filter_empty(&mut self) {
        self.alerts.retain(|alert| !alert.routes.is_empty());
    }

    pub fn save_json(&self, target: &std::path::Path) -> Result<()> {
        #[derive(Serialize)]
        struct Document<'a> {
            time: String,
            alerts: &'a [Alert],
        }

        let doc = Document {
            time: self.timestamp.to_rfc3339(),
            alerts: &self.alerts,
        };
        rt::write_atomic(target, &serde_json::to_vec_pretty(&doc)?)
    }

    pub fn save_pb(&self, target: &std::path::Path, human_readable: bool) -> Result<()> {
        rt::write_feed(target, &self.as_feed_message(), human_readable)
    }
}

/// Runs one full alerts pass against the given route snapshot.
pub async fn make<C>(client: Arc<C>, routes: Arc<RouteMap>, opts: &Options) -> Result<()>
where
    C: HttpClient + Send + Sync + 'static,
{
    let timestamp = Utc::now();

    info!("fetching RSS feeds");
    let mut items = rss::fetch_items(&*client, URL_IMPEDIMENTS, Effect::ReducedService).await?;
    items.extend(rss::fetch_items(&*client, URL_CHANGES, Effect::OtherEffect).await?);

    let mut stubs = Vec::with_capacity(items.len());
    for item in &items {
        stubs.push(Alert::from_rss_item(item, &routes)?);
    }

    // One task per alert; the client's politeness lock keeps the host at
    // one request at a time. Each task owns its alert, so the fan-out has
    // nothing to race on.
    let mut tasks = JoinSet::new();
    for alert in stubs {
        let client = Arc::clone(&client);
        let routes = Arc::clone(&routes);
        tasks.spawn(async move { load_detail(alert, client, routes).await });
    }

    let mut alerts = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (alert, error) = joined?;
        if let Some(error) = error {
            warn!("scraping {} failed: {error}", alert.id);
            errors.push(error);
        }
        alerts.push(alert);
    }

    // Strict mode still lets every fetch finish, then fails on the first
    // collected error.
    if opts.strict {
        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }
    }

    let mut container = AlertContainer { timestamp, alerts };
    container.filter_empty();
    container.alerts.sort_by(|a, b| a.id.cmp(&b.id));

    if let Some(json_target) = &opts.json_target {
        info!("exporting alerts JSON");
        container.save_json(json_target)?;
    }
    info!("exporting alerts GTFS-Realtime");
    container.save_pb(&opts.gtfs_rt_target, opts.human_readable)?;
    Ok(())
}

/// Fetches and processes one alert's detail page. The alert keeps whatever
/// state it accumulated before a failure; the caller decides whether the
/// error is fatal.
async fn load_detail<C: HttpClient>(
    mut alert: Alert,
    client: Arc<C>,
    routes: Arc<RouteMap>,
) -> (Alert, Option<Error>) {
    let result = fetch_detail(&mut alert, &*client, &routes).await;
    (alert, result.err())
}

async fn fetch_detail<C: HttpClient + ?Sized>(
    alert: &mut Alert,
    client: &C,
    routes: &RouteMap,
) -> Result<()> {
    let url = Url::parse(&alert.link)?;
    let host = url.host_str().unwrap_or_default();
    if !EXPECTED_HOSTS.contains(&host) {
        return Err(Error::UnexpectedHost {
            context: alert.id.clone(),
            host: host.to_string(),
            expected: "wtp.waw.pl",
        });
    }

    info!("fetching alert description from {}", alert.link);
    let page = fetch::fetch_text(client, &alert.link).await?;
    apply_detail_page(alert, &page, routes);
    Ok(())
}

/// Applies a fetched detail page to an alert: route flags when the title
/// seeded nothing, then the sanitized body and its plaintext rendering.
pub fn apply_detail_page(alert: &mut Alert, page: &str, routes: &RouteMap) {
    let document = Html::parse_document(page);

    if alert.routes.is_empty() {
        for flag in html::icon_flags(&document, alert.effect) {
            let bucket = match flag.as_str() {
                "metro" => "1",
                "tramwaje" => "0",
                "skm" | "kolej" => "2",
                "autobusy" => "3",
                _ => continue,
            };
            if let Some(ids) = routes.get(bucket) {
                alert.routes.extend(ids.iter().cloned());
            }
        }
    }

    alert.html_body = html::sanitize_body(&html::extract_body(document, alert.effect));
    alert.body = plaintext::to_plaintext(&alert.html_body);
}
