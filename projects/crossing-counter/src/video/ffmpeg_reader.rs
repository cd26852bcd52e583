use super::{FrameSource, VideoProperties};
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::Video;
use opencv::{core, prelude::*};
use std::path::Path;

/// Video reader backed by the FFmpeg libraries via ffmpeg-next.
/// Decodes on the CPU and converts every frame to BGR24.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<scaling::Context>,
    properties: VideoProperties,
    packet: ffmpeg_next::codec::packet::Packet,
    /// Whether we've sent EOF to the decoder.
    eof_sent: bool,
    frames_decoded: u64,
}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {:?}", path));
        }

        let input_ctx = ffmpeg_next::format::input(&path)
            .with_context(|| format!("Failed to open video file {:?}", path))?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {:?}", path))?;
        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let frame_rate = if rational_fps.numerator() > 0 && rational_fps.denominator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!("FfmpegReader: could not determine FPS, defaulting to 30.0");
            30.0
        };

        let stream_frames = video_stream.frames();
        let frame_count = if stream_frames > 0 {
            Some(stream_frames as u64)
        } else {
            let duration_secs = input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64;
            (duration_secs > 0.0).then(|| (duration_secs * frame_rate).round() as u64)
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(anyhow!("Video {:?} reports an empty resolution", path));
        }

        let properties = VideoProperties {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate,
            frame_count,
        };

        tracing::info!(
            "FfmpegReader: opened {:?}, {}x{}, fps={:.2}, estimated_frames={:?}",
            path,
            properties.width,
            properties.height,
            frame_rate,
            frame_count
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            properties,
            packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
            frames_decoded: 0,
        })
    }

    /// Pulls the next decoded frame into `target`. Returns `false` once the
    /// decoder has been drained.
    fn decode_into(&mut self, target: &mut Video) -> Result<bool> {
        loop {
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            // Feed packets until one belongs to the video stream, or flush at EOF.
            let mut found_packet = false;
            while packet_available(self.packet.read(&mut self.input_ctx))? {
                if self.packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn to_bgr(&mut self, frame: &Video) -> Result<Video> {
        if self.scaler.is_none() {
            let scaler = scaling::Context::get(
                frame.format(),
                self.properties.width,
                self.properties.height,
                Pixel::BGR24,
                self.properties.width,
                self.properties.height,
                scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }

        let mut bgr = Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(frame, &mut bgr).context("Scaler failed")?;
        }
        Ok(bgr)
    }
}

/// End of input stops demuxing; any other read error fails the frame read.
fn packet_available(read: Result<(), ffmpeg_next::Error>) -> Result<bool> {
    match read {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Eof) => Ok(false),
        Err(e) => Err(anyhow!("Failed to read packet: {}", e)),
    }
}

/// Copy a BGR24 ffmpeg frame into an owned OpenCV Mat, dropping row padding.
fn bgr_frame_to_mat(frame: &Video) -> Result<core::Mat> {
    let width = frame.width() as i32;
    let height = frame.height() as i32;
    let row_bytes = width as usize * 3;
    let data = frame.data(0);
    let stride = frame.stride(0);

    let mut mat = core::Mat::new_rows_cols_with_default(
        height,
        width,
        core::CV_8UC3,
        core::Scalar::all(0.0),
    )?;

    for y in 0..height as usize {
        let src_row = &data[y * stride..y * stride + row_bytes];
        let dst_ptr = mat.ptr_mut(y as i32)?;
        unsafe {
            std::ptr::copy_nonoverlapping(src_row.as_ptr(), dst_ptr, row_bytes);
        }
    }

    Ok(mat)
}

impl FrameSource for FfmpegReader {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<core::Mat>> {
        let mut decoded = Video::empty();
        if !self.decode_into(&mut decoded)? {
            tracing::info!(
                "FfmpegReader: end of stream after {} frames",
                self.frames_decoded
            );
            return Ok(None);
        }

        let bgr = self.to_bgr(&decoded)?;
        let mat = bgr_frame_to_mat(&bgr)?;
        self.frames_decoded += 1;
        Ok(Some(mat))
    }

    fn close(self: Box<Self>) -> Result<()> {
        // Decoder and demuxer contexts are freed when dropped.
        tracing::debug!(
            "FfmpegReader: closed after {} decoded frames",
            self.frames_decoded
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_rejected() {
        assert!(FfmpegReader::new(Path::new("/nonexistent/birds.mp4")).is_err());
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp4");
        std::fs::write(&path, [0u8; 64]).unwrap();
        assert!(FfmpegReader::new(&path).is_err());
    }

    #[test]
    fn test_demux_errors_are_not_end_of_stream() {
        assert!(packet_available(Ok(())).unwrap());
        assert!(!packet_available(Err(ffmpeg_next::Error::Eof)).unwrap());
        let err = packet_available(Err(ffmpeg_next::Error::InvalidData)).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read packet"));
    }
}
