pub mod preferences;
pub mod video;

pub use preferences::{PreferencesMessage, PreferencesView};
pub use video::{VideoMessage, VideoView};

use iced::{
    widget::{button, column, image, row, scrollable, slider, text, Column, Row, Space},
    Alignment, Element, Length,
};

use crate::{
    config::{DEFAULT_IMAGE_SIZE, MAX_IMAGE_SIZE, MIN_IMAGE_SIZE},
    domain::FetchResult,
};

// Width the tile grid is laid out for.
const GRID_WIDTH: u32 = 1200;

pub struct GalleryItem {
    pub result: FetchResult,
    handle: Option<image::Handle>,
}

impl GalleryItem {
    fn new(result: FetchResult) -> Self {
        // Handles are built once per refresh so the renderer can cache them.
        let handle = result
            .image
            .as_ref()
            .map(|img| image::Handle::from_rgba(img.width, img.height, img.pixels.clone()));
        Self { result, handle }
    }
}

/// Main view state
pub struct GalleryView {
    pub items: Vec<GalleryItem>,
    pub selected: Option<String>,
    pub image_size: u32,
    pub status_message: String,
    pub last_refresh: Option<String>,
    pub is_refreshing: bool,
    pub automatic_refresh: bool,
}

impl Default for GalleryView {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: None,
            image_size: DEFAULT_IMAGE_SIZE,
            status_message: "Loading images, please wait...".to_string(),
            last_refresh: None,
            is_refreshing: false,
            automatic_refresh: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GalleryMessage {
    RefreshPressed,
    AutomaticRefreshToggled,
    ImageSizeChanged(u32),
    ImageSizeCommitted,
    ResetImageSize,
    Selected(String),
    HidePressed(String),
    RestoreDefaultsPressed,
    PreferencesPressed,
    WebsitePressed,
    PlayVideoPressed(String),
}

impl GalleryView {
    pub fn set_results(&mut self, results: Vec<FetchResult>) {
        self.items = results.into_iter().map(GalleryItem::new).collect();

        let still_there = self
            .selected
            .as_ref()
            .is_some_and(|id| self.items.iter().any(|item| &item.result.descriptor.id == id));
        if !still_there {
            self.selected = None;
        }
    }

    pub fn selected(&self) -> Option<&FetchResult> {
        let id = self.selected.as_ref()?;
        self.items
            .iter()
            .map(|item| &item.result)
            .find(|result| &result.descriptor.id == id)
    }

    pub fn update(&mut self, message: GalleryMessage) {
        match message {
            GalleryMessage::ImageSizeChanged(size) => {
                self.image_size = size;
            }
            GalleryMessage::ResetImageSize => {
                self.image_size = DEFAULT_IMAGE_SIZE;
            }
            GalleryMessage::Selected(id) => {
                self.selected = if self.selected.as_deref() == Some(id.as_str()) {
                    None
                } else {
                    Some(id)
                };
            }
            _ => {
                // Will be handled by the app
            }
        }
    }

    pub fn view(&self) -> Element<'_, GalleryMessage> {
        let refresh_label = if self.is_refreshing {
            "Refreshing..."
        } else {
            "Refresh"
        };
        let auto_label = if self.automatic_refresh {
            "Auto Refresh: On"
        } else {
            "Auto Refresh: Off"
        };

        let toolbar = row![
            button(refresh_label)
                .on_press_maybe((!self.is_refreshing).then_some(GalleryMessage::RefreshPressed))
                .padding([10, 20]),
            button(auto_label)
                .on_press(GalleryMessage::AutomaticRefreshToggled)
                .padding([10, 20]),
            button("Restore Defaults")
                .on_press(GalleryMessage::RestoreDefaultsPressed)
                .padding([10, 20]),
            button("Preferences")
                .on_press(GalleryMessage::PreferencesPressed)
                .padding([10, 20]),
            button("SDO Website")
                .on_press(GalleryMessage::WebsitePressed)
                .padding([10, 20]),
            text("Size").size(14),
            slider(
                MIN_IMAGE_SIZE..=MAX_IMAGE_SIZE,
                self.image_size,
                GalleryMessage::ImageSizeChanged
            )
            .on_release(GalleryMessage::ImageSizeCommitted)
            .width(Length::Fixed(200.0)),
            button("Reset")
                .on_press(GalleryMessage::ResetImageSize)
                .padding([10, 20]),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let mut content = column![
            text("Solar Dynamics Observatory").size(32),
            toolbar,
            text(&self.status_message).size(14),
        ]
        .spacing(10);

        if let Some(last_refresh) = &self.last_refresh {
            content = content.push(text(last_refresh).size(12));
        }

        if let Some(result) = self.selected() {
            content = content.push(details(result));
        }

        content = content.push(Space::new().height(Length::Fixed(10.0)));
        content = content.push(scrollable(self.grid()).height(Length::Fill));

        content.padding(20).into()
    }

    fn grid(&self) -> Element<'_, GalleryMessage> {
        let per_row = (GRID_WIDTH / self.image_size.max(1)).max(1) as usize;
        let size = self.image_size as f32;

        let rows = self.items.chunks(per_row).map(|chunk| -> Element<'_, GalleryMessage> {
            Row::with_children(chunk.iter().map(|item| self.tile(item, size)))
                .spacing(10)
                .into()
        });

        Column::with_children(rows).spacing(10).into()
    }

    fn tile<'a>(&'a self, item: &'a GalleryItem, size: f32) -> Element<'a, GalleryMessage> {
        let descriptor = &item.result.descriptor;

        let picture: Element<'a, GalleryMessage> = match &item.handle {
            Some(handle) => image(handle.clone())
                .width(Length::Fixed(size))
                .height(Length::Fixed(size))
                .into(),
            None => column![text("Image unavailable").size(12)]
                .width(Length::Fixed(size))
                .height(Length::Fixed(size))
                .align_x(Alignment::Center)
                .into(),
        };

        button(column![picture, text(&descriptor.title).size(14)].spacing(4))
            .on_press(GalleryMessage::Selected(descriptor.id.clone()))
            .padding(4)
            .into()
    }
}

fn details(result: &FetchResult) -> Element<'_, GalleryMessage> {
    let descriptor = &result.descriptor;
    let mut panel = column![text(&descriptor.title).size(20)].spacing(6);

    if let Some(description) = &descriptor.text {
        panel = panel.push(text(description).size(14));
    }

    let facts = [
        ("Location", &descriptor.location),
        ("Wavelength", &descriptor.wavelength),
        ("Primary ions", &descriptor.ions),
        ("Temperature", &descriptor.temperature),
    ];
    for (label, value) in facts {
        if let Some(value) = value {
            panel = panel.push(text(format!("{}: {}", label, value)).size(13));
        }
    }

    let mut actions = row![button("Hide")
        .on_press(GalleryMessage::HidePressed(descriptor.id.clone()))
        .padding([6, 14])]
    .spacing(10);
    if descriptor.video.is_some() {
        actions = actions.push(
            button("Play Video")
                .on_press(GalleryMessage::PlayVideoPressed(descriptor.id.clone()))
                .padding([6, 14]),
        );
    }

    panel.push(actions).padding(10).into()
}
