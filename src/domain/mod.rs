pub mod catalog;
pub mod error;
pub mod model;

pub use catalog::Catalog;
pub use error::AppError;
pub use model::{
    missing_count, DecodedImage, DownloadPhase, FetchResult, ResourceDescriptor, SessionId,
};
