use coffer_core::Config;

/// Preview rendering settings
#[derive(Debug, Clone)]
pub struct ThumbnailRenderConfig {
    /// Output width in pixels; height follows the source aspect ratio.
    pub width: u32,
    /// Offset of the captured video frame.
    pub video_timestamp_secs: f64,
    pub ffmpeg_path: String,
    pub jpeg_quality: u8,
}

impl Default for ThumbnailRenderConfig {
    fn default() -> Self {
        Self {
            width: 320,
            video_timestamp_secs: 1.0,
            ffmpeg_path: "ffmpeg".to_string(),
            jpeg_quality: 85,
        }
    }
}

impl From<&Config> for ThumbnailRenderConfig {
    fn from(config: &Config) -> Self {
        Self {
            width: config.thumbnail_width(),
            video_timestamp_secs: config.thumbnail_video_timestamp_secs(),
            ffmpeg_path: config.ffmpeg_path().to_string(),
            ..Self::default()
        }
    }
}
