use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::client::{ApiError, Result};

pub const WEBSITE_URL: &str = "https://sdo.gsfc.nasa.gov";

/// Configuration for the API client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiConfig {
    pub image_base_url: String,
    pub video_base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            image_base_url: "https://sdo.gsfc.nasa.gov/assets/img/latest/".to_string(),
            video_base_url: "https://sdo.gsfc.nasa.gov/assets/img/latest/mpeg/".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn image_base(&self) -> Result<Url> {
        parse_base(&self.image_base_url)
    }

    pub fn video_base(&self) -> Result<Url> {
        parse_base(&self.video_base_url)
    }

    pub fn video_url(&self, file: &str) -> Result<Url> {
        join(&self.video_base()?, file)
    }
}

/// Join a relative file name onto a base directory URL.
pub fn join(base: &Url, file: &str) -> Result<Url> {
    base.join(file)
        .map_err(|e| ApiError::InvalidUrl(format!("{}{}: {}", base, file, e)))
}

// Without the trailing slash `Url::join` would replace the last segment.
fn parse_base(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_url() {
        let config = ApiConfig::default();
        let url = config.video_url("latest_1024_0193.mp4").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sdo.gsfc.nasa.gov/assets/img/latest/mpeg/latest_1024_0193.mp4"
        );
    }

    #[test]
    fn test_base_without_trailing_slash() {
        let config = ApiConfig {
            image_base_url: "http://localhost:1234/latest".to_string(),
            ..Default::default()
        };
        let url = join(&config.image_base().unwrap(), "SDO_2D.jpg").unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/latest/SDO_2D.jpg");
    }

    #[test]
    fn test_invalid_base() {
        let config = ApiConfig {
            video_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.video_base(), Err(ApiError::InvalidUrl(_))));
    }
}
