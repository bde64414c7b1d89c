// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted during a sync run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed has been parsed and compared against the manifest
    FeedParsed {
        podcast_title: String,
        total_episodes: usize,
        new_episodes: usize,
    },

    /// The cover image was downloaded
    CoverDownloaded { path: PathBuf },

    /// A cover file already exists and was left alone
    CoverPresent { path: PathBuf },

    /// The cover image could not be downloaded; the run goes on
    CoverFailed { url: String, error: String },

    /// An episode download is starting
    DownloadStarting {
        episode_title: String,
        /// Position of this episode among the ones being downloaded
        episode_index: usize,
        total_to_download: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    DownloadProgress {
        episode_title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An episode was written to disk and recorded in the manifest
    DownloadCompleted {
        episode_title: String,
        path: PathBuf,
        bytes_downloaded: u64,
    },

    DownloadFailed { episode_title: String, error: String },

    /// Sync operation completed
    SyncCompleted {
        downloaded_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// Ignores all events. Used by tests and quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
