use super::{FrameSink, VideoProperties};
use anyhow::{anyhow, bail, Context, Result};
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::VideoWriter,
};
use std::path::{Path, PathBuf};

/// FourCC codes accepted per container extension.
const CONTAINER_CODECS: &[(&[&str], &[&str])] = &[
    (&["avi"], &["MJPG", "XVID", "DIVX", "MP4V", "FMP4", "H264"]),
    (
        &["mp4", "m4v", "mov"],
        &["MP4V", "AVC1", "H264", "HVC1", "FMP4"],
    ),
    (
        &["mkv"],
        &["MJPG", "XVID", "MP4V", "H264", "AVC1", "VP80", "VP90"],
    ),
    (&["webm"], &["VP80", "VP90"]),
];

/// Checks that `codec` is a FourCC the container named by `path` can hold.
pub fn check_codec_for_container(path: &Path, codec: &str) -> Result<[char; 4]> {
    let chars: Vec<char> = codec.chars().collect();
    let fourcc: [char; 4] = match chars.as_slice() {
        [a, b, c, d] if chars.iter().all(|ch| ch.is_ascii_graphic()) => [*a, *b, *c, *d],
        _ => bail!("Codec {:?} is not a four-character code", codec),
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("Output path {:?} has no container extension", path))?;

    let (_, codecs) = CONTAINER_CODECS
        .iter()
        .find(|(extensions, _)| extensions.contains(&extension.as_str()))
        .ok_or_else(|| anyhow!("Unsupported container '.{}' for {:?}", extension, path))?;

    let upper = codec.to_ascii_uppercase();
    if !codecs.contains(&upper.as_str()) {
        bail!(
            "Codec {} cannot be written to a '.{}' container (expected one of {})",
            codec,
            extension,
            codecs.join(", ")
        );
    }

    Ok(fourcc)
}

/// Sequential writer for the intermediate video.
pub struct OpencvWriter {
    writer: VideoWriter,
    properties: VideoProperties,
    path: PathBuf,
    frames_written: u64,
}

impl OpencvWriter {
    pub fn new(path: &Path, codec: &str, properties: VideoProperties) -> Result<Self> {
        let [c1, c2, c3, c4] = check_codec_for_container(path, codec)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Output directory {:?} does not exist", parent);
            }
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Output path is not valid UTF-8: {:?}", path))?;

        let fourcc = VideoWriter::fourcc(c1, c2, c3, c4)?;
        let size = Size::new(properties.width as i32, properties.height as i32);
        let writer = VideoWriter::new(path_str, fourcc, properties.frame_rate, size, true)
            .with_context(|| format!("Failed to create video writer for {}", path_str))?;
        if !writer.is_opened()? {
            bail!(
                "Video writer refused {} with codec {} at {}x{}",
                path_str,
                codec,
                properties.width,
                properties.height
            );
        }

        tracing::info!(
            "OpencvWriter: writing {} ({}, {}x{} @ {:.2} fps)",
            path_str,
            codec,
            properties.width,
            properties.height,
            properties.frame_rate
        );

        Ok(Self {
            writer,
            properties,
            path: path.to_path_buf(),
            frames_written: 0,
        })
    }
}

impl FrameSink for OpencvWriter {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        let size = frame.size()?;
        if size.width != self.properties.width as i32
            || size.height != self.properties.height as i32
        {
            bail!(
                "Frame {} is {}x{}, writer was opened for {}x{}",
                self.frames_written,
                size.width,
                size.height,
                self.properties.width,
                self.properties.height
            );
        }
        if frame.channels() != 3 {
            bail!(
                "Frame {} has {} channels, expected 3",
                self.frames_written,
                frame.channels()
            );
        }

        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.writer
            .release()
            .with_context(|| format!("Failed to finalize {:?}", self.path))?;
        tracing::info!(
            "OpencvWriter: finalized {:?} with {} frames",
            self.path,
            self.frames_written
        );
        Ok(())
    }
}
