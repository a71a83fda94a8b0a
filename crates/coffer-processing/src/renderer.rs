use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ThumbnailRenderConfig;
use crate::image::ImageThumbnailer;
use crate::kind::MediaKind;
use crate::video::VideoThumbnailer;

/// Turns the bytes of an upload into a JPEG preview.
#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    async fn render(
        &self,
        kind: MediaKind,
        extension: &str,
        data: Bytes,
    ) -> Result<Bytes, anyhow::Error>;
}

/// Default renderer: `image` for stills, ffmpeg for video.
pub struct MediaThumbnailRenderer {
    config: ThumbnailRenderConfig,
    video: VideoThumbnailer,
}

impl MediaThumbnailRenderer {
    pub fn new(config: ThumbnailRenderConfig) -> Self {
        let video = VideoThumbnailer::new(config.ffmpeg_path.clone());
        Self { config, video }
    }
}

#[async_trait]
impl ThumbnailRenderer for MediaThumbnailRenderer {
    async fn render(
        &self,
        kind: MediaKind,
        extension: &str,
        data: Bytes,
    ) -> Result<Bytes, anyhow::Error> {
        let start = std::time::Instant::now();
        let preview = match kind {
            MediaKind::Image => {
                let width = self.config.width;
                let quality = self.config.jpeg_quality;
                tokio::task::spawn_blocking(move || {
                    ImageThumbnailer::render(&data, width, quality)
                })
                .await??
            }
            MediaKind::Video => {
                self.video
                    .render(
                        &data,
                        extension,
                        self.config.width,
                        self.config.video_timestamp_secs,
                    )
                    .await?
            }
        };

        tracing::debug!(
            kind = ?kind,
            preview_bytes = preview.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Thumbnail rendered"
        );

        Ok(preview)
    }
}
