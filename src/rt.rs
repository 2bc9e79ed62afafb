//! GTFS-Realtime feed assembly and file output.

use std::path::Path;

use chrono::{DateTime, Utc};
use prost::Message;

use crate::error::Result;
use crate::gtfs_rt::{feed_header::Incrementality, translated_string, FeedHeader, FeedMessage, TranslatedString};

/// Prepares a `FeedMessage` with a valid header and no entities.
pub fn feed_message(timestamp: DateTime<Utc>) -> FeedMessage {
    FeedMessage {
        header: FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            incrementality: Some(Incrementality::FullDataset as i32),
            timestamp: Some(timestamp.timestamp() as u64),
        },
        entity: Vec::new(),
    }
}

/// Wraps a string into a single-translation `TranslatedString`.
pub fn translated(text: &str) -> TranslatedString {
    TranslatedString {
        translation: vec![translated_string::Translation {
            text: text.to_string(),
            language: None,
        }],
    }
}

/// Writes a feed either as wire bytes or, with `readable`, as a textual
/// dump of the decoded message for eyeballing.
pub fn write_feed(target: &Path, message: &FeedMessage, readable: bool) -> Result<()> {
    if readable {
        write_atomic(target, format!("{message:#?}\n").as_bytes())
    } else {
        write_atomic(target, &message.encode_to_vec())
    }
}

/// Writes through a temporary sibling and renames into place, so consumers
/// polling the target never observe a half-written feed.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, target)?;
    Ok(())
}
