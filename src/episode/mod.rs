mod download;
mod filename;

pub use download::{DownloadContext, download_cover, download_episode};
pub use filename::{MAX_FILENAME_LENGTH, SequenceLabels, episode_filename, sanitize_filename};
