// Pipeline orchestrator: drives one run from source to delivery file
//
// Opens the source and sink, streams every frame through the counter and the
// overlay into the sink, releases both, then hands the intermediate file to
// the converter. Strictly sequential; one frame is finished before the next
// is read.

use crate::pipeline::convert::FormatConverter;
use crate::pipeline::counter::Counter;
use crate::pipeline::error::{PipelineError, Stage};
use crate::pipeline::overlay::OverlayRenderer;
pub use crate::pipeline::types::{CountState, PipelineState, RunReport};
use crate::run_artifacts::{RegionShape, RegionSpec};
use crate::video::{FrameSink, FrameSource, Frames, MediaBackend, VideoProperties};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Paths and codec for a single run
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub input_path: PathBuf,
    pub intermediate_path: PathBuf,
    pub intermediate_codec: String,
    pub final_output_path: PathBuf,
    pub region: RegionSpec,
}

pub struct Orchestrator {
    plan: RunPlan,
    renderer: OverlayRenderer,
    state: PipelineState,
    history: Vec<PipelineState>,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(plan: RunPlan, renderer: OverlayRenderer) -> Self {
        Self {
            plan,
            renderer,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, in order, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("Pipeline state {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Runs the whole pipeline once. Ends in `Done` on success and `Failed`
    /// otherwise; a finished orchestrator cannot be run again.
    pub fn run(
        &mut self,
        media: &dyn MediaBackend,
        counter: &mut dyn Counter,
        converter: &dyn FormatConverter,
    ) -> Result<RunReport, PipelineError> {
        if self.state.is_terminal() {
            return Err(PipelineError::AlreadyFinished { state: self.state });
        }

        let result = self.execute(media, counter, converter);
        match &result {
            Ok(report) => {
                self.transition(PipelineState::Done);
                tracing::info!(
                    "Run complete: {} frames, in={}, out={}",
                    report.frames_written,
                    report.final_counts.in_count,
                    report.final_counts.out_count
                );
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                tracing::debug!("Run failed after state {}: {}", self.previous_state(), e);
            }
        }
        result
    }

    fn previous_state(&self) -> PipelineState {
        let n = self.history.len();
        if n >= 2 {
            self.history[n - 2]
        } else {
            self.state
        }
    }

    fn execute(
        &mut self,
        media: &dyn MediaBackend,
        counter: &mut dyn Counter,
        converter: &dyn FormatConverter,
    ) -> Result<RunReport, PipelineError> {
        let mut source = media
            .open_source(&self.plan.input_path)
            .map_err(|e| PipelineError::io(Stage::OpenSource, e))?;
        self.transition(PipelineState::SourceOpen);

        let properties = source.properties();
        self.warn_about_geometry(&properties);

        let mut sink = match media.open_sink(
            &self.plan.intermediate_path,
            &self.plan.intermediate_codec,
            properties,
        ) {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(close_err) = source.close() {
                    tracing::warn!("Failed to release source after sink error: {:#}", close_err);
                }
                return Err(PipelineError::io(Stage::OpenSink, e));
            }
        };
        self.transition(PipelineState::SinkOpen);

        self.transition(PipelineState::Streaming);
        let streamed = self.stream(source.as_mut(), sink.as_mut(), counter, &properties);

        self.transition(PipelineState::Draining);
        let released = release(source, sink);

        let frame_counts = match streamed {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(release_err) = released {
                    tracing::warn!("Release after failure also failed: {:#}", release_err);
                }
                return Err(e);
            }
        };
        released.map_err(|e| PipelineError::io(Stage::Release, e))?;

        converter.convert(&self.plan.intermediate_path, &self.plan.final_output_path)?;
        self.transition(PipelineState::Converted);

        Ok(RunReport {
            properties,
            frames_written: frame_counts.len(),
            final_counts: frame_counts.last().copied().unwrap_or_default(),
            frame_counts,
            intermediate_path: self.plan.intermediate_path.clone(),
            final_output_path: self.plan.final_output_path.clone(),
        })
    }

    fn stream(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        counter: &mut dyn Counter,
        properties: &VideoProperties,
    ) -> Result<Vec<CountState>, PipelineError> {
        let pb = self.progress_bar(properties);
        let mut frame_counts = Vec::new();

        for (index, frame) in Frames::new(source).enumerate() {
            let frame = frame.map_err(|e| PipelineError::io(Stage::ReadFrame, e))?;

            let (mut frame, counts) = counter
                .count(frame, &self.plan.region)
                .map_err(|source| PipelineError::Capability {
                    frame: index,
                    source,
                })?;

            self.renderer
                .render(&mut frame, counts)
                .map_err(|e| PipelineError::io(Stage::RenderOverlay, e))?;

            sink.write(&frame)
                .map_err(|e| PipelineError::io(Stage::WriteFrame, e))?;

            if let Some(last) = frame_counts.last() {
                if !counts.follows(last) {
                    tracing::warn!(
                        "Counter went backwards at frame {}: {:?} -> {:?}",
                        index,
                        last,
                        counts
                    );
                }
            }
            frame_counts.push(counts);
            pb.inc(1);
        }

        pb.finish_with_message("Done");
        Ok(frame_counts)
    }

    fn progress_bar(&self, properties: &VideoProperties) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match properties.frame_count {
            Some(total) => {
                let pb = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        }
    }

    fn warn_about_geometry(&self, properties: &VideoProperties) {
        match self.plan.region.shape() {
            RegionShape::Line | RegionShape::Polygon => {}
            RegionShape::Irregular(n) => tracing::warn!(
                "Region has {} points; expected 2 (line) or 4 (polygon), passing through unchanged",
                n
            ),
        }
        let outside = self.plan.region.out_of_bounds(properties);
        if !outside.is_empty() {
            tracing::warn!(
                "{} region point(s) lie outside the {}x{} frame: {:?}",
                outside.len(),
                properties.width,
                properties.height,
                outside
            );
        }
        let readout = self.renderer.readout();
        if !readout.fits_within(properties) {
            tracing::warn!(
                "Overlay box {:?} does not fit a {}x{} frame and will be clipped",
                readout,
                properties.width,
                properties.height
            );
        }
    }
}

/// Closes both resources exactly once, reporting the first failure.
fn release(source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> anyhow::Result<()> {
    let source_result = source.close();
    let sink_result = sink.close();
    source_result?;
    sink_result
}
