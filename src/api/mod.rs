pub mod client;
pub mod models;
pub mod transport;

pub use client::{ApiClient, ApiError};
pub use models::ApiConfig;
pub use transport::{ByteStream, Transport};
