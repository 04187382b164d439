use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    api::ApiConfig,
    domain::{AppError, Catalog, FetchResult},
};

const DEFAULT_CONFIG: &str = include_str!("../assets/default.toml");

pub const DEFAULT_IMAGE_SIZE: u32 = 256;
pub const MIN_IMAGE_SIZE: u32 = 64;
pub const MAX_IMAGE_SIZE: u32 = 1024;
pub const MIN_REFRESH_INTERVAL: u64 = 60;

/// User preferences, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub image_size: u32,
    /// Seconds between automatic refreshes.
    pub refresh_interval: u64,
    pub automatic_refresh: bool,
    /// Display order and visibility. Catalog entries not listed here are
    /// shown after these, in catalog order.
    #[serde(default)]
    pub images: Vec<ImageVisibility>,
    #[serde(default)]
    pub service: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVisibility {
    pub id: String,
    pub display: bool,
}

impl Preferences {
    /// Load preferences: the user file if it exists, built-in defaults otherwise.
    pub fn load() -> Result<Self, AppError> {
        let path = Self::config_path();
        if !path.exists() {
            debug!(path = %path.display(), "no preferences file, using defaults");
            return Self::defaults();
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| AppError::Config(e.to_string()))?;
        let preferences = Self::from_toml(&content)?;
        info!(path = %path.display(), "loaded preferences");
        Ok(preferences)
    }

    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        toml::from_str(content).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn defaults() -> Result<Self, AppError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Save current preferences to the user config file.
    pub fn save(&self) -> Result<(), AppError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        debug!(path = %path.display(), "saved preferences");
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", "sdo-viewer")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Reset display settings and image visibility, keeping the service section.
    pub fn restore_defaults(&mut self) -> Result<(), AppError> {
        let defaults = Self::defaults()?;
        self.image_size = defaults.image_size;
        self.refresh_interval = defaults.refresh_interval;
        self.automatic_refresh = defaults.automatic_refresh;
        self.images = defaults.images;
        Ok(())
    }

    pub fn refresh_interval_secs(&self) -> u64 {
        self.refresh_interval.max(MIN_REFRESH_INTERVAL)
    }

    pub fn set_refresh_interval(&mut self, secs: u64) {
        self.refresh_interval = secs.max(MIN_REFRESH_INTERVAL);
    }

    /// Every catalog entry with its visibility, in display order. Stored
    /// entries no longer in the catalog are left out.
    pub fn entries(&self, catalog: &Catalog) -> Vec<ImageVisibility> {
        let listed = self
            .images
            .iter()
            .filter(|entry| catalog.get(&entry.id).is_some())
            .cloned();

        let unlisted = catalog
            .iter()
            .filter(|d| !self.images.iter().any(|entry| entry.id == d.id))
            .map(|d| ImageVisibility {
                id: d.id.clone(),
                display: true,
            });

        listed.chain(unlisted).collect()
    }

    /// Move an image `offset` places in the display order. Returns false when
    /// the image is unknown or the move would leave the list.
    pub fn move_image(&mut self, catalog: &Catalog, id: &str, offset: isize) -> bool {
        let mut entries = self.entries(catalog);
        let Some(from) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let Some(to) = from.checked_add_signed(offset).filter(|&to| to < entries.len()) else {
            return false;
        };

        let entry = entries.remove(from);
        entries.insert(to, entry);
        self.images = entries;
        true
    }

    pub fn set_image_size(&mut self, size: u32) {
        self.image_size = size.clamp(MIN_IMAGE_SIZE, MAX_IMAGE_SIZE);
    }

    pub fn set_visible(&mut self, id: &str, display: bool) {
        match self.images.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => entry.display = display,
            None => self.images.push(ImageVisibility {
                id: id.to_string(),
                display,
            }),
        }
    }

    /// Visible results in display order: listed entries first, then the
    /// rest in their original order.
    pub fn arrange(&self, results: &[FetchResult]) -> Vec<FetchResult> {
        let listed = self.images.iter().filter_map(|entry| {
            results
                .iter()
                .find(|r| r.descriptor.id == entry.id)
                .map(|r| (r, entry.display))
        });

        let unlisted = results
            .iter()
            .filter(|r| !self.images.iter().any(|entry| entry.id == r.descriptor.id))
            .map(|r| (r, true));

        listed
            .chain(unlisted)
            .filter(|(_, display)| *display)
            .map(|(r, _)| r.clone())
            .collect()
    }
}
