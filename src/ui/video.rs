use std::{path::Path, sync::Arc};

use iced::{
    widget::{button, column, progress_bar, row, text, Space},
    Element, Length,
};
use tracing::warn;

use crate::{
    application::{DownloadEvent, VideoFile},
    domain::{DownloadPhase, SessionId},
    utils::format_bytes,
};

/// State of the video panel for one companion video.
pub struct VideoView {
    pub key: String,
    pub title: String,
    pub session: SessionId,
    pub phase: DownloadPhase,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub file: Option<Arc<VideoFile>>,
    pub status_message: String,
}

#[derive(Debug, Clone)]
pub enum VideoMessage {
    OpenPressed,
    SavePressed,
    RetryPressed,
    ClosePressed,
}

impl VideoView {
    pub fn new(key: String, title: String, session: SessionId) -> Self {
        Self {
            key,
            title,
            session,
            phase: DownloadPhase::Idle,
            downloaded: 0,
            total: None,
            file: None,
            status_message: "Loading video, please wait...".to_string(),
        }
    }

    /// Restart the panel for a fresh session of the same video.
    pub fn restart(&mut self, session: SessionId) {
        self.discard();
        self.session = session;
        self.phase = DownloadPhase::Idle;
        self.downloaded = 0;
        self.total = None;
        self.status_message = "Loading video, please wait...".to_string();
    }

    pub fn apply(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress { downloaded, total } => {
                self.phase = DownloadPhase::InFlight;
                self.downloaded = downloaded;
                self.total = total;
                self.status_message = match total {
                    Some(total) => format!(
                        "Downloading: {} of {}",
                        format_bytes(downloaded),
                        format_bytes(total)
                    ),
                    None => format!("Downloading: {}", format_bytes(downloaded)),
                };
            }
            DownloadEvent::Completed(file) => {
                self.phase = DownloadPhase::Succeeded;
                self.status_message = format!("Ready: {}", file.path().display());
                self.file = Some(file);
            }
            DownloadEvent::Failed(error) => {
                self.phase = DownloadPhase::Failed;
                self.status_message = format!("Download failed: {}", error);
            }
        }
    }

    /// Release the downloaded file, deleting it once no one else holds it.
    pub fn discard(&mut self) {
        if let Some(file) = self.file.take() {
            if let Ok(file) = Arc::try_unwrap(file) {
                if let Err(e) = file.discard() {
                    warn!(error = %e, "failed to delete downloaded video");
                }
            }
        }
    }

    /// Path of the finished download, if there is one to play.
    pub fn playable(&self) -> Option<&Path> {
        match self.phase {
            DownloadPhase::Succeeded => self.file.as_ref().map(|file| file.path()),
            _ => None,
        }
    }

    fn progress(&self) -> f32 {
        match (self.phase, self.total) {
            (DownloadPhase::Succeeded, _) => 1.0,
            (_, Some(total)) if total > 0 => self.downloaded as f32 / total as f32,
            _ => 0.0,
        }
    }

    pub fn view(&self) -> Element<'_, VideoMessage> {
        let mut actions = row![].spacing(10);
        if self.playable().is_some() {
            actions = actions.push(
                button("Open")
                    .on_press(VideoMessage::OpenPressed)
                    .padding([10, 20]),
            );
            actions = actions.push(
                button("Save As...")
                    .on_press(VideoMessage::SavePressed)
                    .padding([10, 20]),
            );
        }
        if self.phase == DownloadPhase::Failed {
            actions = actions.push(
                button("Retry")
                    .on_press(VideoMessage::RetryPressed)
                    .padding([10, 20]),
            );
        }
        actions = actions.push(
            button("Close")
                .on_press(VideoMessage::ClosePressed)
                .padding([10, 20]),
        );

        column![
            text(&self.title).size(24),
            Space::new().height(Length::Fixed(10.0)),
            progress_bar(0.0..=1.0, self.progress()),
            text(&self.status_message).size(14),
            Space::new().height(Length::Fixed(10.0)),
            actions,
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

impl Drop for VideoView {
    fn drop(&mut self) {
        self.discard();
    }
}
