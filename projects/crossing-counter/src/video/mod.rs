pub mod ffmpeg_reader;
pub mod opencv_reader;
pub mod writer;

use anyhow::Result;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::path::Path;

/// Resolution and timing of an opened source. Fixed for the whole run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Container hint, only used for progress reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
}

pub trait FrameSource {
    fn properties(&self) -> VideoProperties;
    /// `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
    fn close(self: Box<Self>) -> Result<()>;
}

pub trait FrameSink {
    fn write(&mut self, frame: &Mat) -> Result<()>;
    /// Flushes and finalizes the container.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Lazy, non-restartable view over a source. Ends for good at end-of-stream
/// or after yielding the first error.
pub struct Frames<'a> {
    source: &'a mut dyn FrameSource,
    finished: bool,
}

impl<'a> Frames<'a> {
    pub fn new(source: &'a mut dyn FrameSource) -> Self {
        Self {
            source,
            finished: false,
        }
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<Mat>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Frames<'_> {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Opencv,
    Ffmpeg,
}

/// Opens the sources and sinks used by a run.
pub trait MediaBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
    fn open_sink(
        &self,
        path: &Path,
        codec: &str,
        properties: VideoProperties,
    ) -> Result<Box<dyn FrameSink>>;
}

/// Local files: decoding via the selected backend, encoding via OpenCV.
pub struct LocalMedia {
    backend: Backend,
}

impl LocalMedia {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

impl MediaBackend for LocalMedia {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(match self.backend {
            Backend::Opencv => Box::new(opencv_reader::OpencvReader::new(path)?),
            Backend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegReader::new(path)?),
        })
    }

    fn open_sink(
        &self,
        path: &Path,
        codec: &str,
        properties: VideoProperties,
    ) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(writer::OpencvWriter::new(path, codec, properties)?))
    }
}
