pub mod refresh_coordinator;
pub mod video_downloader;

pub use refresh_coordinator::RefreshCoordinator;
pub use video_downloader::{DownloadEvent, VideoDownloader, VideoFile};
