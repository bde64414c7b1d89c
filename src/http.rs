// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Body of a binary download, delivered chunk by chunk
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// An in-flight binary download: status line, declared size and body
pub struct StreamedResponse {
    pub status: u16,
    /// Content-Length header value, if the server sent one
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl StreamedResponse {
    /// Whether the server answered with a client or server error
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Outbound HTTP used by the downloader.
///
/// Feeds are small and read whole; episodes and covers are streamed to disk.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET a document and return its whole body, whatever the status code
    async fn fetch_document(&self, url: &str) -> Result<Bytes, reqwest::Error>;

    /// GET a binary resource as a stream
    async fn open_stream(&self, url: &str) -> Result<StreamedResponse, reqwest::Error>;
}

/// `HttpClient` backed by a default `reqwest::Client`
#[derive(Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch_document(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.client.get(url).send().await?.bytes().await
    }

    async fn open_stream(&self, url: &str) -> Result<StreamedResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        Ok(StreamedResponse {
            status,
            content_length,
            body: Box::pin(response.bytes_stream()),
        })
    }
}
