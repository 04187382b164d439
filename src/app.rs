use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Local;
use futures::StreamExt;
use iced::{task, widget::column, Subscription, Task};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::{models::WEBSITE_URL, ApiClient},
    application::{DownloadEvent, RefreshCoordinator, VideoDownloader, VideoFile},
    config::{Preferences, DEFAULT_IMAGE_SIZE},
    domain::{missing_count, AppError, Catalog, FetchResult, SessionId},
    ui::{
        GalleryMessage, GalleryView, PreferencesMessage, PreferencesView, VideoMessage, VideoView,
    },
    utils::format_refresh_time,
};

/// Everything loaded before the window opens.
#[derive(Clone)]
pub struct Bootstrap {
    catalog: Arc<Catalog>,
    preferences: Preferences,
    client: Arc<ApiClient>,
    image_base: Url,
}

impl Bootstrap {
    pub fn load() -> Result<Self, AppError> {
        let preferences = Preferences::load().or_else(|e| {
            warn!(error = %e, "unreadable preferences, falling back to defaults");
            Preferences::defaults()
        })?;

        let catalog = Arc::new(Catalog::builtin()?);
        let client = Arc::new(ApiClient::new(preferences.service.clone())?);
        let image_base = client.config().image_base()?;

        info!(images = catalog.len(), base = %image_base, "catalog loaded");

        Ok(Self {
            catalog,
            preferences,
            client,
            image_base,
        })
    }
}

pub struct SdoApp {
    gallery: GalleryView,
    video: Option<VideoView>,
    settings: Option<PreferencesView>,
    video_task: Option<task::Handle>,
    catalog: Arc<Catalog>,
    preferences: Preferences,
    coordinator: RefreshCoordinator,
    downloader: VideoDownloader,
    image_base: Url,
}

#[derive(Debug, Clone)]
pub enum Message {
    Gallery(GalleryMessage),
    Video(VideoMessage),
    Preferences(PreferencesMessage),
    RefreshTick,
    /// Aggregate of one refresh cycle, delivered on the UI thread
    RefreshFinished(Result<Vec<FetchResult>, AppError>),
    VideoEvent(SessionId, DownloadEvent),
    /// Destination chosen in the save dialog, None if cancelled
    VideoSaved(Result<Option<PathBuf>, String>),
}

pub fn new(bootstrap: Bootstrap) -> (SdoApp, Task<Message>) {
    let Bootstrap {
        catalog,
        preferences,
        client,
        image_base,
    } = bootstrap;

    let gallery = GalleryView {
        image_size: preferences.image_size,
        automatic_refresh: preferences.automatic_refresh,
        ..Default::default()
    };

    let mut app = SdoApp {
        gallery,
        video: None,
        settings: None,
        video_task: None,
        catalog,
        preferences,
        coordinator: RefreshCoordinator::with_shared(client.clone()),
        downloader: VideoDownloader::with_shared(client),
        image_base,
    };

    let task = start_refresh(&mut app);
    (app, task)
}

pub fn update(app: &mut SdoApp, message: Message) -> Task<Message> {
    match message {
        Message::Gallery(ui_msg) => {
            app.gallery.update(ui_msg.clone());

            match ui_msg {
                GalleryMessage::RefreshPressed => return start_refresh(app),
                GalleryMessage::AutomaticRefreshToggled => {
                    app.preferences.automatic_refresh = !app.preferences.automatic_refresh;
                    app.gallery.automatic_refresh = app.preferences.automatic_refresh;
                    save_preferences(app);
                }
                GalleryMessage::ImageSizeChanged(size) => {
                    app.preferences.set_image_size(size);
                    app.gallery.image_size = app.preferences.image_size;
                }
                GalleryMessage::ImageSizeCommitted => save_preferences(app),
                GalleryMessage::ResetImageSize => {
                    app.preferences.image_size = DEFAULT_IMAGE_SIZE;
                    save_preferences(app);
                }
                GalleryMessage::HidePressed(id) => {
                    app.preferences.set_visible(&id, false);
                    rearrange(app);
                    save_preferences(app);
                }
                GalleryMessage::RestoreDefaultsPressed => {
                    if let Err(e) = app.preferences.restore_defaults() {
                        app.gallery.status_message = format!("Cannot restore defaults: {}", e);
                    } else {
                        app.gallery.image_size = app.preferences.image_size;
                        app.gallery.automatic_refresh = app.preferences.automatic_refresh;
                        if let Some(settings) = app.settings.as_mut() {
                            *settings = PreferencesView::new(&app.preferences);
                        }
                        rearrange(app);
                        save_preferences(app);
                    }
                }
                GalleryMessage::PreferencesPressed => {
                    app.settings = match app.settings {
                        Some(_) => None,
                        None => Some(PreferencesView::new(&app.preferences)),
                    };
                }
                GalleryMessage::WebsitePressed => {
                    if let Err(e) = open::that(WEBSITE_URL) {
                        warn!(url = WEBSITE_URL, error = %e, "failed to open website");
                    }
                }
                GalleryMessage::PlayVideoPressed(id) => return start_video(app, id),
                GalleryMessage::Selected(_) => {}
            }
        }
        Message::Preferences(msg) => {
            if let Some(settings) = app.settings.as_mut() {
                settings.update(msg.clone());
            }

            match msg {
                PreferencesMessage::VisibilityToggled(id, display) => {
                    app.preferences.set_visible(&id, display);
                    rearrange(app);
                    save_preferences(app);
                }
                PreferencesMessage::MoveUp(id) => move_image(app, &id, -1),
                PreferencesMessage::MoveDown(id) => move_image(app, &id, 1),
                PreferencesMessage::IntervalSubmitted => {
                    if let Some(secs) = app.settings.as_ref().and_then(PreferencesView::interval) {
                        app.preferences.set_refresh_interval(secs);
                        save_preferences(app);
                    }
                    if let Some(settings) = app.settings.as_mut() {
                        settings.interval_input = app.preferences.refresh_interval.to_string();
                    }
                }
                PreferencesMessage::ClosePressed => app.settings = None,
                PreferencesMessage::IntervalChanged(_) => {}
            }
        }
        Message::RefreshTick => return start_refresh(app),
        Message::RefreshFinished(result) => match result {
            Ok(results) => {
                app.gallery.is_refreshing = false;

                let missing = missing_count(&results);
                app.gallery.status_message = if missing > 0 {
                    format!(
                        "Some images could not be downloaded at this time ({} of {} missing)",
                        missing,
                        results.len()
                    )
                } else {
                    format!("{} images", results.len())
                };
                app.gallery.last_refresh = Some(format_refresh_time(&Local::now()));
                app.gallery.set_results(app.preferences.arrange(&results));
            }
            Err(AppError::RefreshInProgress) => {
                debug!("refresh already running, request ignored");
            }
            Err(e) => {
                app.gallery.is_refreshing = false;
                app.gallery.status_message = format!("Refresh failed: {}", e);
            }
        },
        Message::Video(VideoMessage::ClosePressed) => close_video(app),
        Message::Video(VideoMessage::RetryPressed) => {
            if let Some(key) = app.video.as_ref().map(|view| view.key.clone()) {
                return start_video(app, key);
            }
        }
        Message::Video(VideoMessage::OpenPressed) => {
            if let Some(view) = app.video.as_mut() {
                if let Some(path) = view.playable().map(|path| path.to_path_buf()) {
                    if let Err(e) = open::that(&path) {
                        warn!(path = %path.display(), error = %e, "failed to open video");
                        view.status_message = format!("Cannot open video: {}", e);
                    }
                }
            }
        }
        Message::Video(VideoMessage::SavePressed) => {
            if let Some(file) = app.video.as_ref().and_then(|view| view.file.clone()) {
                return Task::perform(save_copy(file), Message::VideoSaved);
            }
        }
        Message::VideoEvent(session, event) => match app.video.as_mut() {
            Some(view) if view.session == session => view.apply(event),
            // Dropping the event releases any file a stale session produced.
            _ => debug!(session = %session, "ignoring event from a retired session"),
        },
        Message::VideoSaved(result) => {
            if let Some(view) = app.video.as_mut() {
                view.status_message = match result {
                    Ok(Some(path)) => format!("Saved: {}", path.display()),
                    Ok(None) => "Save cancelled".to_string(),
                    Err(e) => format!("Save failed: {}", e),
                };
            }
        }
    }
    Task::none()
}

pub fn view(app: &SdoApp) -> iced::Element<'_, Message> {
    let mut content = column![];

    if let Some(settings) = &app.settings {
        content = content.push(
            settings
                .view(&app.preferences, &app.catalog)
                .map(Message::Preferences),
        );
    }
    if let Some(video) = &app.video {
        content = content.push(video.view().map(Message::Video));
    }

    content.push(app.gallery.view().map(Message::Gallery)).into()
}

pub fn subscription(app: &SdoApp) -> Subscription<Message> {
    if app.preferences.automatic_refresh {
        iced::time::every(Duration::from_secs(app.preferences.refresh_interval_secs()))
            .map(|_| Message::RefreshTick)
    } else {
        Subscription::none()
    }
}

fn start_refresh(app: &mut SdoApp) -> Task<Message> {
    if app.gallery.is_refreshing || app.coordinator.is_refreshing() {
        return Task::none();
    }

    app.gallery.is_refreshing = true;
    app.gallery.status_message = "Refreshing images...".to_string();

    let coordinator = app.coordinator.clone();
    let catalog = app.catalog.clone();
    let base = app.image_base.clone();

    // iced Task::perform runs in the background tokio executor
    Task::perform(
        async move { coordinator.refresh_all(&catalog, &base).await },
        Message::RefreshFinished,
    )
}

fn start_video(app: &mut SdoApp, key: String) -> Task<Message> {
    let Some(descriptor) = app.catalog.get(&key).cloned() else {
        warn!(key = %key, "unknown catalog entry");
        return Task::none();
    };
    let Some(video) = descriptor.video.as_deref() else {
        return Task::none();
    };

    let url = match app.preferences.service.video_url(video) {
        Ok(url) => url,
        Err(e) => {
            app.gallery.status_message = format!("Cannot open video: {}", e);
            return Task::none();
        }
    };

    let (session, stream) = app.downloader.download(key.clone(), url);

    match app.video.as_mut() {
        Some(view) if view.key == key => view.restart(session),
        _ => app.video = Some(VideoView::new(key, descriptor.title.clone(), session)),
    }

    let (task, handle) =
        Task::stream(stream.map(move |event| Message::VideoEvent(session, event))).abortable();
    // Replacing the handle aborts the previous download stream.
    app.video_task = Some(handle.abort_on_drop());
    task
}

fn close_video(app: &mut SdoApp) {
    app.video_task = None;
    app.video = None;
    debug!(
        in_flight = app.downloader.registry().in_flight(),
        "video panel closed"
    );
}

fn move_image(app: &mut SdoApp, id: &str, offset: isize) {
    if app.preferences.move_image(&app.catalog, id, offset) {
        rearrange(app);
        save_preferences(app);
    }
}

/// Re-apply visibility preferences to the last aggregate.
fn rearrange(app: &mut SdoApp) {
    let latest = app.coordinator.latest();
    app.gallery.set_results(app.preferences.arrange(&latest));
}

fn save_preferences(app: &mut SdoApp) {
    if let Err(e) = app.preferences.save() {
        warn!(error = %e, "failed to save preferences");
        app.gallery.status_message = format!("Cannot save preferences: {}", e);
    }
}

async fn save_copy(file: Arc<VideoFile>) -> Result<Option<PathBuf>, String> {
    let suggested = file
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());

    let Some(handle) = rfd::AsyncFileDialog::new()
        .set_file_name(&suggested)
        .save_file()
        .await
    else {
        return Ok(None);
    };

    let target = handle.path().to_path_buf();
    tokio::fs::copy(file.path(), &target)
        .await
        .map_err(|e| e.to_string())?;

    info!(path = %target.display(), "saved video copy");
    Ok(Some(target))
}
