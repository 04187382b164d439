use chrono::{DateTime, Local};
use url::Url;

/// Extension used when a video URL carries no usable file name.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Local file name for a downloaded video: the last path segment of the URL,
/// or a generated `video.mp4` when the URL has none.
pub fn video_file_name(url: &Url) -> String {
    let name = url
        .path_segments()
        .and_then(|segments| segments.last())
        .map(sanitize_filename)
        .map(|name| name.trim_matches(|c| c == '.' || c == ' ').to_string())
        .unwrap_or_default();

    if name.is_empty() {
        format!("video.{}", VIDEO_EXTENSION)
    } else if !name.contains('.') {
        format!("{}.{}", name, VIDEO_EXTENSION)
    } else {
        name
    }
}

pub fn format_refresh_time(time: &DateTime<Local>) -> String {
    format!("Last Refreshed: {}", time.format("%Y-%m-%d %H:%M:%S"))
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test/file.mp4"), "test_file.mp4");
        assert_eq!(sanitize_filename("normal-name.mp4"), "normal-name.mp4");
    }

    #[test]
    fn test_video_file_name() {
        let url = Url::parse("https://sdo.test/latest/mpeg/latest_1024_0193.mp4").unwrap();
        assert_eq!(video_file_name(&url), "latest_1024_0193.mp4");

        let url = Url::parse("https://sdo.test/latest/mpeg/").unwrap();
        assert_eq!(video_file_name(&url), "video.mp4");

        let url = Url::parse("https://sdo.test/stream").unwrap();
        assert_eq!(video_file_name(&url), "stream.mp4");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
