// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::{HttpClient, StreamedResponse};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Where an episode sits in the current run, for progress display
#[derive(Debug, Clone, Copy)]
pub struct DownloadContext {
    pub episode_index: usize,
    pub total_to_download: usize,
}

/// Download an episode's enclosure to `output_path`.
///
/// Streams the response body to disk, reporting progress through the
/// reporter. Returns the number of bytes written. An existing file at
/// `output_path` is overwritten.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    episode: &Episode,
    output_path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = open_download(client, &episode.url).await?;

    reporter.report(ProgressEvent::DownloadStarting {
        episode_title: episode.title.clone(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
        content_length: response.content_length,
    });

    let total_bytes = response.content_length;
    write_body(response, &episode.url, output_path, |bytes_downloaded| {
        reporter.report(ProgressEvent::DownloadProgress {
            episode_title: episode.title.clone(),
            bytes_downloaded,
            total_bytes,
        });
    })
    .await
}

/// Download a cover image to `output_path`
pub async fn download_cover<C: HttpClient>(
    client: &C,
    image_url: &str,
    output_path: &Path,
) -> Result<u64, DownloadError> {
    let response = open_download(client, image_url).await?;
    write_body(response, image_url, output_path, |_| {}).await
}

async fn open_download<C: HttpClient>(
    client: &C,
    url: &str,
) -> Result<StreamedResponse, DownloadError> {
    let response = client
        .open_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    // Don't save an error page in place of the media
    if response.is_error() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response)
}

async fn write_body(
    response: StreamedResponse,
    url: &str,
    output_path: &Path,
    mut on_progress: impl FnMut(u64),
) -> Result<u64, DownloadError> {
    let write_failed = |e| DownloadError::FileWriteFailed {
        path: output_path.to_path_buf(),
        source: e,
    };

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk).await.map_err(write_failed)?;

        bytes_downloaded += chunk.len() as u64;
        on_progress(bytes_downloaded);
    }

    file.flush().await.map_err(write_failed)?;

    Ok(bytes_downloaded)
}
