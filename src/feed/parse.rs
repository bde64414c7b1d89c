// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};

use crate::error::FeedError;

use super::date::parse_date;

/// Only enclosures of exactly this type are downloaded
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

const UNTITLED_EPISODE: &str = "Untitled Episode";

/// Represents a parsed podcast feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub image_url: Option<String>,
    /// The URL the feed was fetched from, verbatim
    pub feed_url: String,
    /// Newest first; undated episodes last
    pub episodes: Vec<Episode>,
}

/// Represents a single podcast episode
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub title: String,
    /// Enclosure URL exactly as it appears in the feed. This is the
    /// episode's identity in the manifest.
    pub url: String,
    /// Raw `pubDate` text
    pub pub_date: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
}

impl Episode {
    pub fn new(title: impl Into<String>, url: impl Into<String>, pub_date: Option<&str>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            pub_date: pub_date.map(String::from),
            published: parse_date(pub_date),
        }
    }
}

/// Parse RSS feed XML bytes into a Podcast
pub fn parse_feed(xml_bytes: &[u8], feed_url: &str) -> Result<Podcast, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let title = channel.title().trim();
    if title.is_empty() {
        return Err(FeedError::MissingTitle);
    }

    let mut episodes: Vec<Episode> = channel.items().iter().filter_map(parse_episode).collect();
    sort_newest_first(&mut episodes);

    let image_url = channel
        .image()
        .map(|img| img.url().trim())
        .filter(|url| !url.is_empty())
        .or_else(|| {
            channel
                .itunes_ext()
                .and_then(|ext| ext.image())
                .map(str::trim)
                .filter(|url| !url.is_empty())
        })
        .map(String::from);

    Ok(Podcast {
        title: decode_text(title),
        image_url,
        feed_url: feed_url.to_string(),
        episodes,
    })
}

/// Items without an `audio/mpeg` enclosure are not episodes for our purposes
fn parse_episode(item: &rss::Item) -> Option<Episode> {
    let enclosure = item
        .enclosure()
        .filter(|enc| enc.mime_type() == AUDIO_MIME_TYPE)?;

    let title = item
        .title()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(decode_text)
        .unwrap_or_else(|| UNTITLED_EPISODE.to_string());

    Some(Episode::new(title, enclosure.url(), item.pub_date()))
}

/// Undo leftover HTML escaping (`&amp;amp;` and friends are common in feeds)
fn decode_text(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Sort descending by publication date. Undated episodes compare lower than
/// any date and so end up last; the sort is stable so their feed order holds.
pub fn sort_newest_first(episodes: &mut [Episode]) {
    episodes.sort_by(|a, b| b.published.cmp(&a.published));
}
