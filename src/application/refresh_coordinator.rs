use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, PoisonError, RwLock,
};

use bytes::Bytes;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::{models::join, ApiClient, Transport},
    domain::{missing_count, AppError, Catalog, DecodedImage, FetchResult, ResourceDescriptor},
};

/// Fetches every catalog image concurrently and hands back one ordered
/// aggregate per refresh.
///
/// Only one refresh runs at a time: a call made while another is in flight
/// returns [`AppError::RefreshInProgress`] without touching the network.
pub struct RefreshCoordinator<T = ApiClient> {
    transport: Arc<T>,
    refreshing: Arc<AtomicBool>,
    latest: Arc<RwLock<Vec<FetchResult>>>,
}

impl<T> Clone for RefreshCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            refreshing: self.refreshing.clone(),
            latest: self.latest.clone(),
        }
    }
}

impl<T: Transport> RefreshCoordinator<T> {
    #[cfg(test)]
    pub fn new(transport: T) -> Self {
        Self::with_shared(Arc::new(transport))
    }

    pub fn with_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            refreshing: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Last aggregate produced by [`refresh_all`](Self::refresh_all).
    pub fn latest(&self) -> Vec<FetchResult> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn refresh_all(
        &self,
        catalog: &Catalog,
        base_url: &Url,
    ) -> Result<Vec<FetchResult>, AppError> {
        let _guard = RefreshGuard::acquire(&self.refreshing).ok_or(AppError::RefreshInProgress)?;

        if catalog.is_empty() {
            self.store(Vec::new());
            return Ok(Vec::new());
        }

        info!(count = catalog.len(), base = %base_url, "refreshing images");

        let handles: Vec<_> = catalog
            .iter()
            .map(|descriptor| {
                let transport = self.transport.clone();
                let descriptor = descriptor.clone();
                let url = join(base_url, &descriptor.file).map_err(AppError::from);
                tokio::spawn(async move { fetch_one(transport, descriptor, url).await })
            })
            .collect();

        // join_all yields in input order, whatever order the tasks finish in.
        let outcomes = futures::future::join_all(handles).await;

        let results: Vec<FetchResult> = catalog
            .iter()
            .zip(outcomes)
            .map(|(descriptor, outcome)| {
                outcome.unwrap_or_else(|e| {
                    warn!(id = %descriptor.id, error = %e, "fetch task aborted");
                    FetchResult {
                        descriptor: descriptor.clone(),
                        image: None,
                    }
                })
            })
            .collect();

        info!(
            total = results.len(),
            missing = missing_count(&results),
            "refresh finished"
        );

        self.store(results.clone());
        Ok(results)
    }

    fn store(&self, results: Vec<FetchResult>) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = results;
    }
}

async fn fetch_one<T: Transport>(
    transport: Arc<T>,
    descriptor: Arc<ResourceDescriptor>,
    url: Result<Url, AppError>,
) -> FetchResult {
    let image = match download_and_decode(transport.as_ref(), url).await {
        Ok(image) => {
            debug!(id = %descriptor.id, width = image.width, height = image.height, "image ready");
            Some(image)
        }
        Err(e) => {
            warn!(id = %descriptor.id, file = %descriptor.file, error = %e, "image unavailable");
            None
        }
    };

    FetchResult { descriptor, image }
}

async fn download_and_decode<T: Transport>(
    transport: &T,
    url: Result<Url, AppError>,
) -> Result<DecodedImage, AppError> {
    let payload = transport.fetch(url?).await?;

    tokio::task::spawn_blocking(move || decode(&payload))
        .await
        .map_err(|e| AppError::Decode(e.to_string()))?
}

fn decode(payload: &Bytes) -> Result<DecodedImage, AppError> {
    let rgba = image::load_from_memory(payload)
        .map_err(|e| AppError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(DecodedImage {
        width,
        height,
        pixels: Bytes::from(rgba.into_raw()),
    })
}

/// Holds the busy flag for the lifetime of one refresh.
struct RefreshGuard(Arc<AtomicBool>);

impl RefreshGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
