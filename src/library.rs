// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use url::Url;

use crate::episode::sanitize_filename;
use crate::error::LibraryError;
use crate::manifest::Manifest;

/// File inside the podcast directory remembering where the feed came from
pub const FEED_URL_FILENAME: &str = "podcast_url.txt";

const COVER_STEM: &str = "cover";

/// Used when a podcast title sanitizes to nothing, or to `.` or `..`
const UNTITLED_PODCAST: &str = "untitled_podcast";

/// The directory holding everything downloaded for one podcast
#[derive(Debug, Clone)]
pub struct PodcastDir {
    path: PathBuf,
}

impl PodcastDir {
    /// Create (if needed) the directory for `podcast_title` under `output_dir`
    pub fn create(output_dir: &Path, podcast_title: &str) -> Result<Self, LibraryError> {
        let path = output_dir.join(directory_name(podcast_title));

        std::fs::create_dir_all(&path).map_err(|e| LibraryError::CreateDirectoryFailed {
            path: path.clone(),
            source: e,
        })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the feed URL, replacing whatever was there
    pub fn write_feed_url(&self, feed_url: &str) -> Result<(), LibraryError> {
        let path = self.path.join(FEED_URL_FILENAME);
        std::fs::write(&path, feed_url).map_err(|e| LibraryError::WriteFailed { path, source: e })
    }

    /// Where the cover for `image_url` lives, e.g. `cover.jpg`
    pub fn cover_path(&self, image_url: &str) -> PathBuf {
        self.path
            .join(format!("{}{}", COVER_STEM, cover_extension(image_url)))
    }

    pub fn episode_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }

    pub fn open_manifest(&self) -> Result<Manifest, LibraryError> {
        Ok(Manifest::open(&self.path)?)
    }
}

/// Directory name for a podcast title. Never names `output_dir` itself or
/// its parent.
pub fn directory_name(podcast_title: &str) -> String {
    let name = sanitize_filename(podcast_title);
    match name.as_str() {
        "" | "." | ".." => UNTITLED_PODCAST.to_string(),
        _ => name,
    }
}

/// Extension of the last path segment of `image_url`, including the dot.
///
/// Taken verbatim (no case folding) and empty when the name has no
/// extension. Leading dots of the name don't count, so `.jpg` alone has none.
pub fn cover_extension(image_url: &str) -> String {
    let path = match Url::parse(image_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => image_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let name = path.rsplit('/').next().unwrap_or_default();
    let stem_start = name.len() - name.trim_start_matches('.').len();

    name[stem_start..]
        .rfind('.')
        .map(|dot| name[stem_start + dot..].to_string())
        .unwrap_or_default()
}
