// Frame pipeline: counting, overlay, conversion and the run state machine

pub mod convert;
pub mod counter;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod overlay;
pub mod tracker;
pub mod types;
