// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::episode::{
    DownloadContext, SequenceLabels, download_cover, download_episode, episode_filename,
};
use crate::error::{EpisodeError, SyncError};
use crate::feed::{Episode, Podcast, fetch_feed};
use crate::http::HttpClient;
use crate::library::PodcastDir;
use crate::manifest::Manifest;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Options for podcast synchronization
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Maximum number of new episodes to attempt, newest first (None = all)
    pub limit: Option<usize>,
}

/// What happened to the podcast cover during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoverOutcome {
    /// The feed names no cover image
    NotInFeed,
    Downloaded { path: PathBuf },
    /// A file was already at the cover path; it is never re-fetched
    AlreadyPresent { path: PathBuf },
    Failed { url: String, error: String },
}

/// An episode that could not be downloaded in this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEpisode {
    pub title: String,
    pub url: String,
    pub error: String,
}

/// Result of a sync operation
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub podcast_title: String,
    pub podcast_dir: PathBuf,
    /// Number of audio episodes in the feed
    pub total_episodes: usize,
    /// Episodes not attempted because the manifest already lists them or an
    /// earlier episode in the feed has the same URL
    pub skipped: usize,
    /// Files written in this run, in download order
    pub new_downloads: Vec<PathBuf>,
    pub failed: Vec<FailedEpisode>,
    pub cover: CoverOutcome,
}

/// Synchronize a podcast feed into `output_dir`.
///
/// Fetches the feed, prepares the podcast directory, fetches the cover if
/// needed and then downloads every episode the manifest doesn't list yet,
/// one at a time and newest first. Feed and directory problems abort the
/// run; a failing episode is reported and skipped.
pub async fn sync_podcast<C: HttpClient>(
    client: &C,
    feed_url: &str,
    output_dir: &Path,
    options: &SyncOptions,
    reporter: SharedProgressReporter,
) -> Result<SyncReport, SyncError> {
    reporter.report(ProgressEvent::FetchingFeed {
        url: feed_url.to_string(),
    });
    info!(%feed_url, "fetching feed");

    let podcast = fetch_feed(client, feed_url).await?;
    debug!(
        title = %podcast.title,
        episodes = podcast.episodes.len(),
        "parsed feed"
    );

    let podcast_dir = PodcastDir::create(output_dir, &podcast.title)?;
    podcast_dir.write_feed_url(feed_url)?;

    let cover = sync_cover(client, &podcast, &podcast_dir, &reporter).await;

    let mut manifest = podcast_dir.open_manifest()?;

    let total_episodes = podcast.episodes.len();
    // Each URL is attempted at most once per run, even if the first try fails
    let mut seen = HashSet::new();
    let pending: Vec<&Episode> = podcast
        .episodes
        .iter()
        .filter(|episode| !manifest.contains(&episode.url) && seen.insert(episode.url.as_str()))
        .collect();
    let new_episodes = pending.len();
    let skipped = total_episodes - new_episodes;
    let total_to_download = options
        .limit
        .map_or(new_episodes, |limit| limit.min(new_episodes));

    reporter.report(ProgressEvent::FeedParsed {
        podcast_title: podcast.title.clone(),
        total_episodes,
        new_episodes,
    });

    let mut labels = SequenceLabels::new();
    let mut new_downloads = Vec::new();
    let mut failed = Vec::new();

    for (episode_index, &episode) in pending.iter().take(total_to_download).enumerate() {
        let context = DownloadContext {
            episode_index,
            total_to_download,
        };

        let label = labels.label_for(episode.published.as_ref());
        let path = podcast_dir.episode_path(&episode_filename(&label, episode));

        match fetch_episode(client, episode, &path, &context, &reporter, &mut manifest).await {
            Ok(bytes_downloaded) => {
                info!(path = %path.display(), bytes_downloaded, "downloaded episode");
                reporter.report(ProgressEvent::DownloadCompleted {
                    episode_title: episode.title.clone(),
                    path: path.clone(),
                    bytes_downloaded,
                });
                new_downloads.push(path);
            }
            Err(e) => {
                warn!(title = %episode.title, url = %episode.url, error = %e, "episode failed");
                reporter.report(ProgressEvent::DownloadFailed {
                    episode_title: episode.title.clone(),
                    error: e.to_string(),
                });
                failed.push(FailedEpisode {
                    title: episode.title.clone(),
                    url: episode.url.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    reporter.report(ProgressEvent::SyncCompleted {
        downloaded_count: new_downloads.len(),
        skipped_count: skipped,
        failed_count: failed.len(),
    });

    Ok(SyncReport {
        podcast_title: podcast.title,
        podcast_dir: podcast_dir.path().to_path_buf(),
        total_episodes,
        skipped,
        new_downloads,
        failed,
        cover,
    })
}

/// Download the episode, then record it. The manifest line is only written
/// once the whole file is on disk.
async fn fetch_episode<C: HttpClient>(
    client: &C,
    episode: &Episode,
    path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
    manifest: &mut Manifest,
) -> Result<u64, EpisodeError> {
    let bytes_downloaded = download_episode(client, episode, path, context, reporter).await?;
    manifest.record(&episode.url)?;
    Ok(bytes_downloaded)
}

async fn sync_cover<C: HttpClient>(
    client: &C,
    podcast: &Podcast,
    podcast_dir: &PodcastDir,
    reporter: &SharedProgressReporter,
) -> CoverOutcome {
    let Some(image_url) = podcast.image_url.as_deref() else {
        return CoverOutcome::NotInFeed;
    };

    let path = podcast_dir.cover_path(image_url);
    if path.exists() {
        debug!(path = %path.display(), "cover already present");
        reporter.report(ProgressEvent::CoverPresent { path: path.clone() });
        return CoverOutcome::AlreadyPresent { path };
    }

    match download_cover(client, image_url, &path).await {
        Ok(_) => {
            reporter.report(ProgressEvent::CoverDownloaded { path: path.clone() });
            CoverOutcome::Downloaded { path }
        }
        Err(e) => {
            warn!(url = %image_url, error = %e, "cover download failed");
            reporter.report(ProgressEvent::CoverFailed {
                url: image_url.to_string(),
                error: e.to_string(),
            });
            CoverOutcome::Failed {
                url: image_url.to_string(),
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::FeedError;
    use crate::http::{ByteStream, StreamedResponse};
    use crate::library::FEED_URL_FILENAME;
    use crate::manifest::MANIFEST_FILENAME;
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const FEED_URL: &str = "https://example.com/feed.xml";

    #[derive(Default)]
    struct MockHttpClient {
        feed_xml: String,
        failing: HashSet<String>,
        requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        fn new(feed_xml: &str) -> Self {
            Self {
                feed_xml: feed_xml.to_string(),
                ..Default::default()
            }
        }

        fn failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }

        fn streamed(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|url| url.as_str() != FEED_URL)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn fetch_document(&self, url: &str) -> Result<Bytes, reqwest::Error> {
            self.requests.lock().unwrap().push(url.to_string());
            Ok(Bytes::from(self.feed_xml.clone()))
        }

        async fn open_stream(&self, url: &str) -> Result<StreamedResponse, reqwest::Error> {
            self.requests.lock().unwrap().push(url.to_string());

            let (status, body) = if self.failing.contains(url) {
                (500, "Internal Server Error".to_string())
            } else {
                (200, format!("content of {url}"))
            };
            let len = body.len() as u64;
            let stream: ByteStream = Box::pin(futures::stream::once(async move {
                Ok::<_, reqwest::Error>(Bytes::from(body))
            }));

            Ok(StreamedResponse {
                status,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    const SAMPLE_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast</description>
    <item>
      <title>Episode 1</title>
      <pubDate>Fri, 05 Jan 2024 09:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Announcement</title>
      <pubDate>Sun, 07 Jan 2024 09:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Episode 2: The Sequel</title>
      <pubDate>Wed, 10 Jan 2024 09:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    const UNDATED_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Undated</title>
    <item>
      <title>First</title>
      <pubDate>not a date</pubDate>
      <enclosure url="https://example.com/a.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Dated</title>
      <pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
      <enclosure url="https://example.com/b.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Second</title>
      <enclosure url="https://example.com/c.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    const COVER_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Covered</title>
    <image>
      <url>https://example.com/art/cover.jpg</url>
    </image>
  </channel>
</rss>"#;

    async fn run(client: &MockHttpClient, output_dir: &Path) -> SyncReport {
        run_with(client, output_dir, &SyncOptions::default()).await
    }

    async fn run_with(
        client: &MockHttpClient,
        output_dir: &Path,
        options: &SyncOptions,
    ) -> SyncReport {
        sync_podcast(client, FEED_URL, output_dir, options, NoopReporter::shared())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sync_downloads_new_episodes_newest_first() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(SAMPLE_FEED);

        let report = run(&client, dir.path()).await;

        let podcast_dir = dir.path().join("Test_Podcast");
        assert_eq!(report.podcast_title, "Test Podcast");
        assert_eq!(report.podcast_dir, podcast_dir);
        assert_eq!(report.total_episodes, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.failed.is_empty());
        assert_eq!(
            report.new_downloads,
            [
                podcast_dir.join("20240110_Episode_2_The_Sequel.mp3"),
                podcast_dir.join("20240105_Episode_1.mp3"),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(&report.new_downloads[1]).unwrap(),
            "content of https://example.com/ep1.mp3"
        );

        let manifest = std::fs::read_to_string(podcast_dir.join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(
            manifest,
            "https://example.com/ep2.mp3\nhttps://example.com/ep1.mp3\n"
        );
        assert_eq!(report.cover, CoverOutcome::NotInFeed);
    }

    #[tokio::test]
    async fn second_run_downloads_nothing() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(SAMPLE_FEED);

        run(&client, dir.path()).await;
        let manifest_path = dir.path().join("Test_Podcast").join(MANIFEST_FILENAME);
        let manifest_before = std::fs::read_to_string(&manifest_path).unwrap();

        let report = run(&client, dir.path()).await;

        assert!(report.new_downloads.is_empty());
        assert_eq!(report.skipped, 2);
        assert_eq!(client.streamed().len(), 2);
        assert_eq!(
            std::fs::read_to_string(&manifest_path).unwrap(),
            manifest_before
        );
    }

    #[tokio::test]
    async fn sync_writes_feed_url_file() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(SAMPLE_FEED);

        run(&client, dir.path()).await;

        let stored =
            std::fs::read_to_string(dir.path().join("Test_Podcast").join(FEED_URL_FILENAME))
                .unwrap();
        assert_eq!(stored, FEED_URL);
    }

    #[tokio::test]
    async fn undated_episodes_get_sequence_labels() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(UNDATED_FEED);

        let report = run(&client, dir.path()).await;

        let names: Vec<_> = report
            .new_downloads
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            ["20240101_Dated.mp3", "seq0001_First.mp3", "seq0002_Second.mp3"]
        );
    }

    #[tokio::test]
    async fn failed_episode_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(SAMPLE_FEED).failing("https://example.com/ep2.mp3");

        let report = run(&client, dir.path()).await;

        assert_eq!(report.new_downloads.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].title, "Episode 2: The Sequel");
        assert!(report.failed[0].error.contains("500"));

        let podcast_dir = dir.path().join("Test_Podcast");
        let manifest = std::fs::read_to_string(podcast_dir.join(MANIFEST_FILENAME)).unwrap();
        assert_eq!(manifest, "https://example.com/ep1.mp3\n");
        assert!(!podcast_dir.join("20240110_Episode_2_The_Sequel.mp3").exists());
    }

    #[tokio::test]
    async fn failed_episode_is_retried_on_next_run() {
        let dir = tempdir().unwrap();
        let failing = MockHttpClient::new(SAMPLE_FEED).failing("https://example.com/ep2.mp3");
        run(&failing, dir.path()).await;

        let healthy = MockHttpClient::new(SAMPLE_FEED);
        let report = run(&healthy, dir.path()).await;

        assert_eq!(healthy.streamed(), ["https://example.com/ep2.mp3"]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.new_downloads.len(), 1);
    }

    #[tokio::test]
    async fn manifest_not_file_presence_decides_what_is_downloaded() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(SAMPLE_FEED);

        let first = run(&client, dir.path()).await;
        for path in &first.new_downloads {
            std::fs::remove_file(path).unwrap();
        }

        let second = run(&client, dir.path()).await;
        assert!(second.new_downloads.is_empty());
        assert!(!first.new_downloads[0].exists());
    }

    #[tokio::test]
    async fn sync_respects_limit() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(SAMPLE_FEED);
        let options = SyncOptions { limit: Some(1) };

        let report = run_with(&client, dir.path(), &options).await;

        assert_eq!(client.streamed(), ["https://example.com/ep2.mp3"]);
        assert_eq!(report.new_downloads.len(), 1);

        let report = run_with(&client, dir.path(), &options).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.new_downloads,
            [dir.path().join("Test_Podcast").join("20240105_Episode_1.mp3")]
        );
    }

    #[tokio::test]
    async fn repeated_enclosure_is_downloaded_once() {
        let feed = r#"<rss version="2.0"><channel><title>Dupes</title>
            <item><title>Original</title><pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/same.mp3" type="audio/mpeg"/></item>
            <item><title>Repost</title><pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/same.mp3" type="audio/mpeg"/></item>
        </channel></rss>"#;
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(feed);

        let report = run(&client, dir.path()).await;

        assert_eq!(client.streamed(), ["https://example.com/same.mp3"]);
        assert_eq!(report.new_downloads.len(), 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn failed_repeated_enclosure_is_not_retried_in_the_same_run() {
        let feed = r#"<rss version="2.0"><channel><title>Dupes</title>
            <item><title>Original</title><pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/same.mp3" type="audio/mpeg"/></item>
            <item><title>Other</title><pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
              <enclosure url="https://example.com/other.mp3" type="audio/mpeg"/></item>
            <item><title>Repost</title><pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/same.mp3" type="audio/mpeg"/></item>
        </channel></rss>"#;
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(feed).failing("https://example.com/same.mp3");

        let report = run(&client, dir.path()).await;

        assert_eq!(
            client.streamed(),
            ["https://example.com/same.mp3", "https://example.com/other.mp3"]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.new_downloads.len(), 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn cover_is_downloaded_once() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new(COVER_FEED);
        let cover_path = dir.path().join("Covered").join("cover.jpg");

        let first = run(&client, dir.path()).await;
        assert_eq!(
            first.cover,
            CoverOutcome::Downloaded {
                path: cover_path.clone()
            }
        );
        assert!(cover_path.exists());

        let second = run(&client, dir.path()).await;
        assert_eq!(
            second.cover,
            CoverOutcome::AlreadyPresent { path: cover_path }
        );
        assert_eq!(client.streamed(), ["https://example.com/art/cover.jpg"]);
    }

    #[tokio::test]
    async fn existing_cover_is_never_replaced() {
        let dir = tempdir().unwrap();
        let podcast_dir = dir.path().join("Covered");
        std::fs::create_dir_all(&podcast_dir).unwrap();
        std::fs::write(podcast_dir.join("cover.jpg"), b"").unwrap();

        let client = MockHttpClient::new(COVER_FEED);
        run(&client, dir.path()).await;

        assert!(client.streamed().is_empty());
        assert_eq!(std::fs::read(podcast_dir.join("cover.jpg")).unwrap(), b"");
    }

    #[tokio::test]
    async fn cover_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let client =
            MockHttpClient::new(COVER_FEED).failing("https://example.com/art/cover.jpg");

        let report = run(&client, dir.path()).await;

        assert!(matches!(report.cover, CoverOutcome::Failed { .. }));
        assert!(!dir.path().join("Covered").join("cover.jpg").exists());
    }

    #[tokio::test]
    async fn dot_dot_title_stays_inside_output_dir() {
        let feed = r#"<rss version="2.0"><channel><title>..</title>
            <item><title>Ep</title><pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/ep.mp3" type="audio/mpeg"/></item>
        </channel></rss>"#;
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("out");
        let client = MockHttpClient::new(feed);

        let report = run(&client, &output_dir).await;

        let podcast_dir = output_dir.join("untitled_podcast");
        assert_eq!(report.podcast_dir, podcast_dir);
        assert_eq!(report.new_downloads, [podcast_dir.join("20240102_Ep.mp3")]);
        let root_entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(root_entries, ["out"]);
    }

    #[tokio::test]
    async fn unterminated_manifest_line_is_not_merged_with_new_urls() {
        let feed = r#"<rss version="2.0"><channel><title>Show</title>
            <item><title>New</title><pubDate>Tue, 02 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/new.mp3" type="audio/mpeg"/></item>
            <item><title>Old</title><pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
              <enclosure url="https://example.com/old.mp3" type="audio/mpeg"/></item>
        </channel></rss>"#;
        let dir = tempdir().unwrap();
        let podcast_dir = dir.path().join("Show");
        std::fs::create_dir_all(&podcast_dir).unwrap();
        std::fs::write(
            podcast_dir.join(MANIFEST_FILENAME),
            "https://example.com/old.mp3",
        )
        .unwrap();
        let client = MockHttpClient::new(feed);

        let first = run(&client, dir.path()).await;
        let second = run(&client, dir.path()).await;

        assert_eq!(first.new_downloads, [podcast_dir.join("20240102_New.mp3")]);
        assert!(second.new_downloads.is_empty());
        assert_eq!(client.streamed(), ["https://example.com/new.mp3"]);
    }

    #[tokio::test]
    async fn malformed_feed_is_fatal_and_creates_nothing() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new("<html>Service Unavailable</html>");

        let result = sync_podcast(
            &client,
            FEED_URL,
            dir.path(),
            &SyncOptions::default(),
            NoopReporter::shared(),
        )
        .await;

        assert!(matches!(
            result,
            Err(SyncError::Feed(FeedError::ParseFailed(_)))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = SyncReport {
            podcast_title: "Show".to_string(),
            podcast_dir: PathBuf::from("Show"),
            total_episodes: 3,
            skipped: 2,
            new_downloads: vec![PathBuf::from("Show/20240110_Ep.mp3")],
            failed: vec![],
            cover: CoverOutcome::AlreadyPresent {
                path: PathBuf::from("Show/cover.jpg"),
            },
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_episodes"], 3);
        assert_eq!(json["new_downloads"][0], "Show/20240110_Ep.mp3");
        assert_eq!(json["cover"]["status"], "already_present");
        assert_eq!(json["cover"]["path"], "Show/cover.jpg");
    }
}
