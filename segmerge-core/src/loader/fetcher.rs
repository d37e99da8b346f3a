use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::error::{LoaderError, LoaderResult};
use crate::config::NetworkSection;
use crate::store::Payload;

const VIDEO_MIME: &str = "video/mp4";

/// Network boundary of the loader; swapped for doubles in tests.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, token: Option<&str>) -> LoaderResult<Payload>;

    /// Writes the segment straight to `path`, creating parent directories.
    async fn download_to(&self, url: &Url, token: Option<&str>, path: &Path) -> LoaderResult<()> {
        let bytes = self.fetch(url, token).await?.into_bytes()?;
        ensure_parent(path).await?;
        fs::write(path, bytes)
            .await
            .map_err(|source| LoaderError::io(source, path))
    }
}

#[derive(Debug, Clone)]
pub struct HttpSegmentFetcher {
    client: Client,
    range_requests: bool,
}

impl HttpSegmentFetcher {
    pub fn new(network: &NetworkSection) -> LoaderResult<Self> {
        let client = Client::builder()
            .connect_timeout(network.connect_timeout())
            .timeout(network.read_timeout())
            .user_agent(network.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            range_requests: network.range_requests,
        })
    }

    fn request(&self, url: &Url, token: Option<&str>) -> RequestBuilder {
        let mut request = self.client.get(url.clone()).header(ACCEPT, VIDEO_MIME);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if self.range_requests {
            request = request.header(RANGE, "bytes=0-");
        }
        request
    }

    async fn send(&self, url: &Url, token: Option<&str>) -> LoaderResult<Response> {
        let response = self.request(url, token).send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(response),
            status => Err(LoaderError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SegmentFetcher for HttpSegmentFetcher {
    async fn fetch(&self, url: &Url, token: Option<&str>) -> LoaderResult<Payload> {
        if let Some(path) = file_path(url)? {
            let bytes = fs::read(&path)
                .await
                .map_err(|source| LoaderError::io(source, path))?;
            return Ok(Payload::Raw(bytes));
        }
        let bytes = self.send(url, token).await?.bytes().await?;
        Ok(Payload::Raw(bytes.to_vec()))
    }

    async fn download_to(&self, url: &Url, token: Option<&str>, path: &Path) -> LoaderResult<()> {
        ensure_parent(path).await?;
        if let Some(source) = file_path(url)? {
            fs::copy(&source, path)
                .await
                .map_err(|err| LoaderError::io(err, source))?;
            return Ok(());
        }
        let response = self.send(url, token).await?;
        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(path)
            .await
            .map_err(|source| LoaderError::io(source, path))?;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            file.write_all(&data)
                .await
                .map_err(|source| LoaderError::io(source, path))?;
        }
        file.flush()
            .await
            .map_err(|source| LoaderError::io(source, path))?;
        Ok(())
    }
}

fn file_path(url: &Url) -> LoaderResult<Option<std::path::PathBuf>> {
    if url.scheme() != "file" {
        return Ok(None);
    }
    url.to_file_path().map(Some).map_err(|_| LoaderError::Url {
        url: url.to_string(),
        reason: "not a local file path".into(),
    })
}

async fn ensure_parent(path: &Path) -> LoaderResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| LoaderError::io(source, parent))?;
    }
    Ok(())
}
