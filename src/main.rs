mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::domain::AppError;

fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sdo_viewer=info")),
        )
        .init();

    let bootstrap = app::Bootstrap::load()
        .inspect_err(|e| error!(error = %e, "startup failed"))?;

    iced::application(move || app::new(bootstrap.clone()), app::update, app::view)
        .title("SDO Viewer")
        .subscription(app::subscription)
        .window_size(iced::Size::new(1280.0, 900.0))
        .run()
        .map_err(|e| AppError::Ui(e.to_string()))
}
