use crate::video::VideoProperties;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Cumulative in/out tallies for a run. Owned by the counter, read by everyone else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountState {
    pub in_count: u64,
    pub out_count: u64,
}

impl CountState {
    /// True when neither tally went down relative to `earlier`.
    pub fn follows(&self, earlier: &CountState) -> bool {
        self.in_count >= earlier.in_count && self.out_count >= earlier.out_count
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    SourceOpen,
    SinkOpen,
    Streaming,
    Draining,
    Converted,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::SourceOpen => "source-open",
            PipelineState::SinkOpen => "sink-open",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Converted => "converted",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub properties: VideoProperties,
    pub frames_written: usize,
    pub final_counts: CountState,
    /// Counts as read back after each frame, in source order.
    pub frame_counts: Vec<CountState>,
    pub intermediate_path: PathBuf,
    pub final_output_path: PathBuf,
}
