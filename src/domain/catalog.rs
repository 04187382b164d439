use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use super::{AppError, ResourceDescriptor};

const BUILTIN_CATALOG: &str = include_str!("../../assets/catalog.json");

#[derive(Deserialize)]
struct CatalogDocument {
    images: Vec<ResourceDescriptor>,
}

/// Ordered, immutable list of the images the viewer knows about.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<Arc<ResourceDescriptor>>,
}

impl Catalog {
    /// The catalog shipped with the application.
    pub fn builtin() -> Result<Self, AppError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let document: CatalogDocument =
            serde_json::from_str(json).map_err(|e| AppError::Catalog(e.to_string()))?;
        Self::new(document.images)
    }

    pub fn new(descriptors: Vec<ResourceDescriptor>) -> Result<Self, AppError> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if descriptor.file.trim().is_empty() {
                return Err(AppError::Catalog(format!(
                    "entry {} has no file name",
                    descriptor.id
                )));
            }
            if !seen.insert(descriptor.id.as_str()) {
                return Err(AppError::Catalog(format!(
                    "duplicate identifier {}",
                    descriptor.id
                )));
            }
        }

        Ok(Self {
            entries: descriptors.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.entries.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.len(), 25);

        let first = catalog.iter().next().unwrap();
        assert_eq!(first.file, "latest_1024_0193.jpg");
        assert_eq!(first.video.as_deref(), Some("latest_1024_0193.mp4"));

        let dopplergram = catalog.get("8EFD8ECA-2CF7-485F-A189-1AB1A391B892").unwrap();
        assert_eq!(dopplergram.title, "HMI Dopplergram");
        assert!(dopplergram.video.is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"images":[
            {"id":"a","file":"a.jpg","title":"A"},
            {"id":"a","file":"b.jpg","title":"B"}
        ]}"#;
        assert!(matches!(Catalog::from_json(json), Err(AppError::Catalog(_))));
    }

    #[test]
    fn test_empty_file_rejected() {
        let json = r#"{"images":[{"id":"a","file":" ","title":"A"}]}"#;
        assert!(Catalog::from_json(json).is_err());
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::from_json(r#"{"images":[]}"#).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.get("a").is_none());
    }
}
