use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::models::ApiConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server answered with status {0}")]
    Status(u16),

    #[error("Server returned an empty body")]
    EmptyBody,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.timeout())
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Fetch a whole resource into memory.
    /// Anything but a 200 with a non-empty body is an error.
    pub async fn fetch_bytes(&self, url: &str) -> Result<bytes::Bytes> {
        debug!(url, "fetching resource");

        let response = self
            .http
            .get(url)
            .timeout(self.config.timeout())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(ApiError::EmptyBody);
        }

        Ok(body)
    }

    /// Download file with progress stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        debug!(url = download_url, "opening download stream");

        let response = self.http.get(download_url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::Request);

        Ok((total_size, stream.boxed()))
    }
}
