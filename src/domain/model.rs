use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;

/// Static description of one published image and its optional companion video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    pub file: String,
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub wavelength: Option<String>,
    #[serde(default)]
    pub ions: Option<String>,
    #[serde(default)]
    pub temperature: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

/// RGBA8 pixels of a decoded image.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Outcome of fetching one descriptor during a refresh cycle.
/// A missing image is an expected terminal state, not an error.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub descriptor: Arc<ResourceDescriptor>,
    pub image: Option<DecodedImage>,
}

impl FetchResult {
    pub fn is_missing(&self) -> bool {
        self.image.is_none()
    }
}

pub fn missing_count(results: &[FetchResult]) -> usize {
    results.iter().filter(|r| r.is_missing()).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> Arc<ResourceDescriptor> {
        Arc::new(ResourceDescriptor {
            id: id.to_string(),
            file: format!("{id}.jpg"),
            title: id.to_uppercase(),
            text: None,
            location: None,
            wavelength: None,
            ions: None,
            temperature: None,
            video: None,
        })
    }

    #[test]
    fn test_missing_count() {
        let image = DecodedImage {
            width: 1,
            height: 1,
            pixels: Bytes::from_static(&[0, 0, 0, 255]),
        };
        let results = vec![
            FetchResult {
                descriptor: descriptor("a"),
                image: Some(image),
            },
            FetchResult {
                descriptor: descriptor("b"),
                image: None,
            },
            FetchResult {
                descriptor: descriptor("c"),
                image: None,
            },
        ];
        assert_eq!(missing_count(&results), 2);
        assert!(!results[0].is_missing());
    }

    #[test]
    fn test_descriptor_optional_fields() {
        let d: ResourceDescriptor =
            serde_json::from_str(r#"{"id":"x","file":"x.jpg","title":"X"}"#).unwrap();
        assert_eq!(d.video, None);
        assert_eq!(d.text, None);
    }
}
