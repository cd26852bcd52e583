use super::{FrameSource, VideoProperties};
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};
use std::path::Path;

pub struct OpencvReader {
    capture: VideoCapture,
    properties: VideoProperties,
    frames_read: u64,
}

impl OpencvReader {
    pub fn new(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Video path is not valid UTF-8: {:?}", path))?;
        if !path.exists() {
            return Err(anyhow!("Video file not found: {}", path_str));
        }

        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .with_context(|| format!("Failed to create capture for {}", path_str))?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video file: {}", path_str));
        }

        let width = capture.get(CAP_PROP_FRAME_WIDTH)?;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)?;
        if width < 1.0 || height < 1.0 {
            return Err(anyhow!(
                "Video {} reports an invalid resolution {}x{}",
                path_str,
                width,
                height
            ));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvReader: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?;
        let frame_count = (raw_count > 0.0).then_some(raw_count as u64);

        let properties = VideoProperties {
            width: width as u32,
            height: height as u32,
            frame_rate: fps,
            frame_count,
        };

        tracing::info!(
            "OpencvReader: opened {}, {}x{}, fps={:.2}, stream_frames={:?}",
            path_str,
            properties.width,
            properties.height,
            fps,
            frame_count
        );

        Ok(Self {
            capture,
            properties,
            frames_read: 0,
        })
    }
}

impl FrameSource for OpencvReader {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            tracing::info!(
                "OpencvReader: end of stream after {} frames",
                self.frames_read
            );
            return Ok(None);
        }

        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.capture
            .release()
            .context("Failed to release video capture")?;
        tracing::debug!("OpencvReader: capture released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_rejected() {
        let result = OpencvReader::new(Path::new("/nonexistent/birds.mp4"));
        assert!(result.is_err());
    }

    #[test]
    fn test_undecodable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_video.mp4");
        std::fs::write(&path, b"definitely not an mp4 container").unwrap();
        assert!(OpencvReader::new(&path).is_err());
    }
}
