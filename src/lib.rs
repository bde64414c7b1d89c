pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod library;
pub mod manifest;
pub mod progress;
pub mod sync;

// Re-export main types for convenience
pub use episode::{SequenceLabels, episode_filename, sanitize_filename};
pub use error::{DownloadError, EpisodeError, FeedError, LibraryError, ManifestError, SyncError};
pub use feed::{Episode, Podcast, fetch_feed, parse_date, parse_feed, resolve_feed_source};
pub use http::{HttpClient, ReqwestClient, StreamedResponse};
pub use library::PodcastDir;
pub use manifest::Manifest;
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use sync::{CoverOutcome, FailedEpisode, SyncOptions, SyncReport, sync_podcast};
