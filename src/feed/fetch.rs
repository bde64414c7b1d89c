// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{Podcast, parse_feed};

/// Fetch and parse a podcast feed from a URL.
///
/// The response status is not inspected: an error page simply fails to
/// parse as RSS.
pub async fn fetch_feed<C: HttpClient>(client: &C, url: &str) -> Result<Podcast, FeedError> {
    Url::parse(url)?;

    let bytes = client
        .fetch_document(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    parse_feed(&bytes, url)
}

/// Turn the command-line argument into a feed URL.
///
/// An argument naming an existing file is read and its first non-empty line
/// is used; anything else is taken to be the URL itself.
pub fn resolve_feed_source(source: &str) -> Result<String, FeedError> {
    let path = Path::new(source);
    if !path.is_file() {
        return Ok(source.to_string());
    }

    let content = std::fs::read_to_string(path).map_err(|e| FeedError::SourceReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
        .ok_or_else(|| FeedError::EmptySource(path.to_path_buf()))
}
