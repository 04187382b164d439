use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Instant,
};

use futures::{stream::BoxStream, StreamExt};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::{ApiClient, ByteStream, Transport},
    domain::{AppError, SessionId},
    utils::video_file_name,
};

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress { downloaded: u64, total: Option<u64> },
    Completed(Arc<VideoFile>),
    Failed(AppError),
}

/// A downloaded video living in its own temporary directory.
///
/// The file and its directory are removed when the value is dropped, or
/// earlier through [`VideoFile::discard`].
#[derive(Debug)]
pub struct VideoFile {
    path: PathBuf,
    dir: TempDir,
}

impl VideoFile {
    /// Reserve `name` inside a fresh directory under `temp_root`. The file
    /// itself is left for the caller to write.
    pub fn prepare(temp_root: &Path, name: &str) -> Result<Self, AppError> {
        let dir = tempfile::Builder::new()
            .prefix("sdo-video-")
            .tempdir_in(temp_root)
            .map_err(|e| AppError::Io(format!("Failed to create directory: {}", e)))?;
        let path = dir.path().join(name);
        Ok(Self { path, dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn discard(self) -> Result<(), AppError> {
        let VideoFile { path, dir } = self;
        dir.close()?;
        debug!(path = %path.display(), "discarded downloaded video");
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    id: SessionId,
    url: Url,
    started: Instant,
}

/// In-flight downloads keyed by logical request.
///
/// A key maps to at most one live session; registering a new session for a
/// key retires the previous one.
#[derive(Debug, Clone, Default)]
pub struct DownloadRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl DownloadRegistry {
    fn begin(&self, key: &str, url: &Url) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = SessionEntry {
            id,
            url: url.clone(),
            started: Instant::now(),
        };

        let previous = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);

        if let Some(previous) = previous {
            info!(key, superseded = %previous.id, by = %id, url = %previous.url, "download superseded");
        }

        id
    }

    pub fn is_current(&self, key: &str, id: SessionId) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|entry| entry.id == id)
    }

    fn finish(&self, key: &str, id: SessionId) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(key).is_some_and(|entry| entry.id == id) {
            if let Some(entry) = sessions.remove(key) {
                debug!(key, session = %id, elapsed_ms = entry.started.elapsed().as_millis() as u64, "session released");
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Streams one video at a time per logical request into a private
/// temporary directory, reporting progress along the way.
pub struct VideoDownloader<T = ApiClient> {
    transport: Arc<T>,
    temp_root: PathBuf,
    registry: DownloadRegistry,
}

impl<T> Clone for VideoDownloader<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            temp_root: self.temp_root.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Transport> VideoDownloader<T> {
    #[cfg(test)]
    pub fn new(transport: T) -> Self {
        Self::with_shared(Arc::new(transport))
    }

    pub fn with_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            temp_root: std::env::temp_dir(),
            registry: DownloadRegistry::default(),
        }
    }

    #[cfg(test)]
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn registry(&self) -> &DownloadRegistry {
        &self.registry
    }

    /// Start downloading `url` on behalf of `key`.
    ///
    /// Any session already running for `key` is superseded right away: its
    /// stream ends at its next step without a terminal event and its
    /// temporary files are removed.
    pub fn download(
        &self,
        key: impl Into<String>,
        url: Url,
    ) -> (SessionId, BoxStream<'static, DownloadEvent>) {
        let key = key.into();
        let id = self.registry.begin(&key, &url);
        info!(
            key = %key,
            session = %id,
            url = %url,
            in_flight = self.registry.in_flight(),
            "starting video download"
        );

        let session = Session {
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            key,
            id,
        };

        let stream = futures::stream::unfold(
            DownloadRuntimeState::Start {
                session,
                url,
                temp_root: self.temp_root.clone(),
            },
            |state| async move {
                match state {
                    DownloadRuntimeState::Start {
                        session,
                        url,
                        temp_root,
                    } => {
                        if !session.is_current() {
                            debug!(session = %session.id, "superseded before start");
                            return None;
                        }

                        let ByteStream { total, chunks } =
                            match session.transport.open(url.clone()).await {
                                Ok(body) => body,
                                Err(_) if !session.is_current() => {
                                    debug!(session = %session.id, "superseded while connecting");
                                    return None;
                                }
                                Err(e) => return failed(session, e),
                            };

                        let target = match VideoFile::prepare(&temp_root, &video_file_name(&url)) {
                            Ok(target) => target,
                            Err(e) => return failed(session, e),
                        };

                        let file = match tokio::fs::File::create(target.path()).await {
                            Ok(file) => file,
                            Err(e) => {
                                return failed(
                                    session,
                                    AppError::Io(format!("Failed to create file: {}", e)),
                                )
                            }
                        };

                        Some((
                            DownloadEvent::Progress {
                                downloaded: 0,
                                total,
                            },
                            DownloadRuntimeState::Downloading {
                                session,
                                file,
                                target,
                                chunks,
                                downloaded: 0,
                                total,
                            },
                        ))
                    }
                    DownloadRuntimeState::Downloading {
                        session,
                        mut file,
                        target,
                        mut chunks,
                        mut downloaded,
                        total,
                    } => match chunks.next().await {
                        Some(Ok(chunk)) => {
                            if !session.is_current() {
                                debug!(session = %session.id, "superseded, dropping partial file");
                                return None;
                            }

                            if let Err(e) = file.write_all(&chunk).await {
                                return failed(session, AppError::Io(format!("Write error: {}", e)));
                            }

                            downloaded += chunk.len() as u64;

                            Some((
                                DownloadEvent::Progress { downloaded, total },
                                DownloadRuntimeState::Downloading {
                                    session,
                                    file,
                                    target,
                                    chunks,
                                    downloaded,
                                    total,
                                },
                            ))
                        }
                        Some(Err(_)) if !session.is_current() => {
                            debug!(session = %session.id, "superseded, dropping failed transfer");
                            None
                        }
                        Some(Err(e)) => failed(session, e),
                        None => {
                            if !session.is_current() {
                                debug!(session = %session.id, "superseded at end of body");
                                return None;
                            }

                            if downloaded == 0 {
                                return failed(
                                    session,
                                    AppError::Protocol("Server returned an empty body".into()),
                                );
                            }

                            if let Some(expected) = total.filter(|&t| t != downloaded) {
                                return failed(
                                    session,
                                    AppError::Protocol(format!(
                                        "Received {} of {} bytes",
                                        downloaded, expected
                                    )),
                                );
                            }

                            if let Err(e) = file.sync_all().await {
                                return failed(
                                    session,
                                    AppError::Io(format!("Failed to sync file: {}", e)),
                                );
                            }
                            drop(file);

                            info!(
                                session = %session.id,
                                bytes = downloaded,
                                path = %target.path.display(),
                                "video download complete"
                            );

                            Some((
                                DownloadEvent::Completed(Arc::new(target)),
                                DownloadRuntimeState::Finished,
                            ))
                        }
                    },
                    DownloadRuntimeState::Finished => None,
                }
            },
        );

        (id, stream.boxed())
    }
}

/// Identity of one download; leaves the registry when dropped.
struct Session<T> {
    transport: Arc<T>,
    registry: DownloadRegistry,
    key: String,
    id: SessionId,
}

impl<T> Session<T> {
    fn is_current(&self) -> bool {
        self.registry.is_current(&self.key, self.id)
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        self.registry.finish(&self.key, self.id);
    }
}

enum DownloadRuntimeState<T> {
    Start {
        session: Session<T>,
        url: Url,
        temp_root: PathBuf,
    },
    Downloading {
        session: Session<T>,
        file: tokio::fs::File,
        target: VideoFile,
        chunks: BoxStream<'static, Result<bytes::Bytes, AppError>>,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished,
}

fn failed<T>(
    session: Session<T>,
    error: AppError,
) -> Option<(DownloadEvent, DownloadRuntimeState<T>)> {
    warn!(key = %session.key, session = %session.id, error = %error, "video download failed");
    Some((DownloadEvent::Failed(error), DownloadRuntimeState::Finished))
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use bytes::Bytes;
    use futures::channel::mpsc;

    use super::*;
    use crate::api::ApiConfig;

    type Chunks = mpsc::UnboundedReceiver<Result<Bytes, AppError>>;

    /// Serves bodies fed through channels so tests decide when bytes arrive.
    #[derive(Default)]
    struct ChannelTransport {
        bodies: Mutex<HashMap<String, (Option<u64>, Chunks)>>,
    }

    impl ChannelTransport {
        fn body(&self, url: &str, total: Option<u64>) -> mpsc::UnboundedSender<Result<Bytes, AppError>> {
            let (tx, rx) = mpsc::unbounded();
            self.bodies.lock().unwrap().insert(url.to_string(), (total, rx));
            tx
        }
    }

    impl Transport for ChannelTransport {
        fn fetch(&self, _url: Url) -> impl Future<Output = Result<Bytes, AppError>> + Send {
            async { Err(AppError::Transport("not supported".into())) }
        }

        fn open(&self, url: Url) -> impl Future<Output = Result<ByteStream, AppError>> + Send {
            let body = self.bodies.lock().unwrap().remove(url.as_str());
            async move {
                body.map(|(total, rx)| ByteStream {
                    total,
                    chunks: rx.boxed(),
                })
                .ok_or_else(|| AppError::Protocol("Server answered with status 404".into()))
            }
        }
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn mockito_downloader(
        server: &mockito::ServerGuard,
        root: &Path,
    ) -> (VideoDownloader, ApiConfig) {
        let config = ApiConfig {
            image_base_url: server.url(),
            video_base_url: format!("{}/mpeg/", server.url()),
            timeout_secs: 5,
        };
        let client = ApiClient::new(config.clone()).unwrap();
        (VideoDownloader::new(client).with_temp_root(root), config)
    }

    #[tokio::test]
    async fn test_successful_download() {
        let root = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mpeg/latest_1024_0193.mp4")
            .with_status(200)
            .with_body(vec![42u8; 20_000])
            .create_async()
            .await;

        let (downloader, config) = mockito_downloader(&server, root.path());
        let video_url = config.video_url("latest_1024_0193.mp4").unwrap();
        let (_, stream) = downloader.download("0193", video_url);
        let events: Vec<_> = stream.collect().await;

        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress { downloaded, total } => {
                    assert_eq!(*total, Some(20_000));
                    Some(*downloaded)
                }
                _ => None,
            })
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&20_000));

        let file = match events.last() {
            Some(DownloadEvent::Completed(file)) => file.clone(),
            other => panic!("unexpected terminal event: {:?}", other),
        };
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 20_000);
        assert_eq!(file.path().file_name().unwrap(), "latest_1024_0193.mp4");
        assert_eq!(downloader.registry().in_flight(), 0);

        let path = file.path().to_path_buf();
        let dir = path.parent().unwrap().to_path_buf();
        drop(events);
        drop(file);

        assert!(!path.exists());
        assert!(!dir.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_not_found_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mpeg/missing.mp4")
            .with_status(404)
            .create_async()
            .await;

        let (downloader, config) = mockito_downloader(&server, root.path());
        let (_, stream) = downloader.download("missing", config.video_url("missing.mp4").unwrap());
        let events: Vec<_> = stream.collect().await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DownloadEvent::Failed(AppError::Protocol(_))));
        assert_eq!(entries(root.path()), 0);
        assert_eq!(downloader.registry().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_explicit_discard_removes_file_and_directory() {
        let root = tempfile::tempdir().unwrap();
        let transport = ChannelTransport::default();
        let tx = transport.body("http://sdo.test/mpeg/a.mp4", Some(5));
        tx.unbounded_send(Ok(Bytes::from_static(b"hello"))).unwrap();
        drop(tx);

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (_, stream) = downloader.download("a", url("http://sdo.test/mpeg/a.mp4"));
        let mut events: Vec<_> = stream.collect().await;

        let file = match events.pop() {
            Some(DownloadEvent::Completed(file)) => file,
            other => panic!("unexpected terminal event: {:?}", other),
        };
        drop(events);

        let file = Arc::try_unwrap(file).unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        file.discard().unwrap();
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_new_download_supersedes_previous() {
        let root = tempfile::tempdir().unwrap();
        let transport = ChannelTransport::default();
        let first_tx = transport.body("http://sdo.test/mpeg/first.mp4", Some(6));
        let second_tx = transport.body("http://sdo.test/mpeg/second.mp4", None);

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (first_id, mut first) = downloader.download("video", url("http://sdo.test/mpeg/first.mp4"));

        first_tx.unbounded_send(Ok(Bytes::from_static(b"abc"))).unwrap();
        assert!(matches!(first.next().await, Some(DownloadEvent::Progress { downloaded: 0, .. })));
        assert!(matches!(first.next().await, Some(DownloadEvent::Progress { downloaded: 3, .. })));
        assert_eq!(entries(root.path()), 1);

        let (second_id, second) = downloader.download("video", url("http://sdo.test/mpeg/second.mp4"));
        assert_ne!(first_id, second_id);
        assert!(!downloader.registry().is_current("video", first_id));
        assert!(downloader.registry().is_current("video", second_id));

        first_tx.unbounded_send(Ok(Bytes::from_static(b"def"))).unwrap();
        assert!(first.next().await.is_none());
        assert_eq!(entries(root.path()), 0);

        second_tx.unbounded_send(Ok(Bytes::from_static(b"xyz"))).unwrap();
        drop(second_tx);
        let events: Vec<_> = second.collect().await;

        match events.last() {
            Some(DownloadEvent::Completed(file)) => {
                assert_eq!(std::fs::read(file.path()).unwrap(), b"xyz");
                assert_eq!(file.path().file_name().unwrap(), "second.mp4");
            }
            other => panic!("unexpected terminal event: {:?}", other),
        }
        assert_eq!(entries(root.path()), 1);
        assert_eq!(downloader.registry().in_flight(), 0);

        drop(events);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_retired_session_swallows_transport_error() {
        let root = tempfile::tempdir().unwrap();
        let transport = ChannelTransport::default();
        let first_tx = transport.body("http://sdo.test/mpeg/first.mp4", None);
        let _second_tx = transport.body("http://sdo.test/mpeg/second.mp4", None);

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (_, mut first) = downloader.download("k", url("http://sdo.test/mpeg/first.mp4"));
        assert!(matches!(first.next().await, Some(DownloadEvent::Progress { downloaded: 0, .. })));

        let (_second_id, _second) = downloader.download("k", url("http://sdo.test/mpeg/second.mp4"));
        first_tx
            .unbounded_send(Err(AppError::Transport("reset".into())))
            .unwrap();

        assert!(first.next().await.is_none());
        assert_eq!(entries(root.path()), 0);
    }

    /// Holds every `open` until released, then refuses it.
    #[derive(Default)]
    struct GatedTransport {
        gate: Arc<tokio::sync::Notify>,
    }

    impl Transport for GatedTransport {
        fn fetch(&self, _url: Url) -> impl Future<Output = Result<Bytes, AppError>> + Send {
            async { Err(AppError::Transport("not supported".into())) }
        }

        fn open(&self, _url: Url) -> impl Future<Output = Result<ByteStream, AppError>> + Send {
            let gate = self.gate.clone();
            async move {
                gate.notified().await;
                Err(AppError::Transport("refused".into()))
            }
        }
    }

    #[tokio::test]
    async fn test_retired_session_swallows_connect_error() {
        let root = tempfile::tempdir().unwrap();
        let transport = GatedTransport::default();
        let gate = transport.gate.clone();

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (_, mut first) = downloader.download("k", url("http://sdo.test/mpeg/first.mp4"));
        assert!(futures::poll!(first.next()).is_pending());

        let (_, _second) = downloader.download("k", url("http://sdo.test/mpeg/second.mp4"));
        gate.notify_one();

        assert!(first.next().await.is_none());
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_abandoned_stream_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let transport = ChannelTransport::default();
        let tx = transport.body("http://sdo.test/mpeg/slow.mp4", Some(100));

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (_, mut stream) = downloader.download("slow", url("http://sdo.test/mpeg/slow.mp4"));

        tx.unbounded_send(Ok(Bytes::from_static(b"partial"))).unwrap();
        stream.next().await;
        stream.next().await;
        assert_eq!(entries(root.path()), 1);
        assert_eq!(downloader.registry().in_flight(), 1);

        drop(stream);

        assert_eq!(entries(root.path()), 0);
        assert_eq!(downloader.registry().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_truncated_body_fails() {
        let root = tempfile::tempdir().unwrap();
        let transport = ChannelTransport::default();
        let tx = transport.body("http://sdo.test/mpeg/short.mp4", Some(10));
        tx.unbounded_send(Ok(Bytes::from_static(b"four"))).unwrap();
        drop(tx);

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (_, stream) = downloader.download("short", url("http://sdo.test/mpeg/short.mp4"));
        let events: Vec<_> = stream.collect().await;

        assert!(matches!(events.last(), Some(DownloadEvent::Failed(AppError::Protocol(_)))));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_transport_error_mid_body_fails() {
        let root = tempfile::tempdir().unwrap();
        let transport = ChannelTransport::default();
        let tx = transport.body("http://sdo.test/mpeg/broken.mp4", None);
        tx.unbounded_send(Ok(Bytes::from_static(b"ab"))).unwrap();
        tx.unbounded_send(Err(AppError::Transport("connection reset".into())))
            .unwrap();

        let downloader = VideoDownloader::new(transport).with_temp_root(root.path());
        let (_, stream) = downloader.download("broken", url("http://sdo.test/mpeg/broken.mp4"));
        let events: Vec<_> = stream.collect().await;

        assert_eq!(
            events.last().map(|e| matches!(e, DownloadEvent::Failed(AppError::Transport(_)))),
            Some(true)
        );
        assert_eq!(entries(root.path()), 0);
    }
}
