use crate::pipeline::types::PipelineState;
use std::fmt;
use thiserror::Error;

/// Pipeline step an I/O failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    OpenSource,
    OpenSink,
    ReadFrame,
    RenderOverlay,
    WriteFrame,
    Release,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::OpenSource => "open source",
            Stage::OpenSink => "open sink",
            Stage::ReadFrame => "read frame",
            Stage::RenderOverlay => "render overlay",
            Stage::WriteFrame => "write frame",
            Stage::Release => "release",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed")]
    Io {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("counter failed on frame {frame}")]
    Capability {
        frame: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("transcoder exited with {}: {diagnostics}", exit_label(.code))]
    Conversion {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("could not launch transcoder `{program}`")]
    ConverterUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pipeline already finished in state {state}")]
    AlreadyFinished { state: PipelineState },
}

impl PipelineError {
    pub fn io(stage: Stage, source: anyhow::Error) -> Self {
        PipelineError::Io { stage, source }
    }

    /// Exit code of a failed transcode, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::Conversion { code, .. } => *code,
            _ => None,
        }
    }

    /// True for both flavours of conversion failure.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            PipelineError::Conversion { .. } | PipelineError::ConverterUnavailable { .. }
        )
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
