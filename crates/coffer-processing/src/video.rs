//! Video previews: capture one frame with ffmpeg.

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub struct VideoThumbnailer {
    ffmpeg_path: String,
}

impl VideoThumbnailer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Capture the frame at `timestamp_secs`, scaled to `width` pixels wide, as JPEG.
    /// Falls back to the first frame when the video is shorter than the offset.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn render(
        &self,
        data: &[u8],
        extension: &str,
        width: u32,
        timestamp_secs: f64,
    ) -> Result<Bytes> {
        let dir = tempfile::tempdir().context("Failed to create temp directory")?;
        let input = dir.path().join(format!("input.{}", extension));
        let output = dir.path().join("frame.jpg");

        tokio::fs::write(&input, data)
            .await
            .context("Failed to write video to temp file")?;

        self.capture(&input, &output, width, timestamp_secs).await?;
        if !Self::has_output(&output).await && timestamp_secs > 0.0 {
            tracing::debug!(
                timestamp_secs,
                "No frame at requested offset; capturing first frame"
            );
            self.capture(&input, &output, width, 0.0).await?;
        }

        if !Self::has_output(&output).await {
            return Err(anyhow!("FFmpeg produced no frame"));
        }

        let frame = tokio::fs::read(&output)
            .await
            .context("Failed to read captured frame")?;
        Ok(Bytes::from(frame))
    }

    async fn capture(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        timestamp_secs: f64,
    ) -> Result<()> {
        let args = vec![
            "-ss".to_string(),
            format!("{:.3}", timestamp_secs),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vframes".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-2", width),
            "-q:v".to_string(),
            "2".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("FFmpeg failed: {}", stderr));
        }

        Ok(())
    }

    async fn has_output(path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }
}
