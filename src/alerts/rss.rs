//! Extraction of `<item>` elements from the wtp.waw.pl RSS feeds.

use serde::Deserialize;

use super::Effect;
use crate::error::Result;
use crate::fetch::{self, HttpClient};

/// The subset of an RSS `<item>` the alert pipeline consumes. Each item is
/// tagged with the effect of the feed it came from.
#[derive(Debug, Clone, Deserialize)]
pub struct RssItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    pub effect: Effect,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

/// Parses an RSS document and tags every item with `effect`.
pub fn parse_channel(xml: &str, effect: Effect) -> Result<Vec<RssItem>> {
    let document: RssDocument = quick_xml::de::from_str(xml)?;
    let mut items = document.channel.items;
    for item in &mut items {
        item.effect = effect;
    }
    Ok(items)
}

/// Fetches one RSS feed and returns its tagged items.
pub async fn fetch_items<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    effect: Effect,
) -> Result<Vec<RssItem>> {
    let body = fetch::fetch_text(client, url).await?;
    parse_channel(&body, effect)
}
