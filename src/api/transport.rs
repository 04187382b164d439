use std::future::Future;

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use url::Url;

use super::client::ApiClient;
use crate::domain::AppError;

/// A response body being received chunk by chunk.
pub struct ByteStream {
    pub total: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, AppError>>,
}

/// The HTTP operations the fetch coordinator and the video downloader need.
///
/// `ApiClient` is the production implementation; tests swap in fakes that
/// control latency and chunk delivery.
pub trait Transport: Send + Sync + 'static {
    /// Fetch a whole resource. Non-200 answers and empty bodies are errors.
    fn fetch(&self, url: Url) -> impl Future<Output = Result<Bytes, AppError>> + Send;

    /// Start a streamed download. Non-200 answers are errors.
    fn open(&self, url: Url) -> impl Future<Output = Result<ByteStream, AppError>> + Send;
}

impl Transport for ApiClient {
    fn fetch(&self, url: Url) -> impl Future<Output = Result<Bytes, AppError>> + Send {
        async move { self.fetch_bytes(url.as_str()).await.map_err(AppError::from) }
    }

    fn open(&self, url: Url) -> impl Future<Output = Result<ByteStream, AppError>> + Send {
        async move {
            let (total, stream) = self.download_file_stream(url.as_str()).await?;
            Ok(ByteStream {
                total,
                chunks: stream.map_err(AppError::from).boxed(),
            })
        }
    }
}
