use crate::run_config::RunConfig;
use crate::video::Backend;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON run configuration; built-in defaults are used when absent
    #[arg(long, env = "CROSSING_COUNTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Source video
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Intermediate annotated video
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Delivery video produced by the transcoder
    #[arg(long)]
    pub final_output: Option<PathBuf>,

    /// RT-DETR ONNX model file
    #[arg(long)]
    pub model: Option<String>,

    /// Decoder used to read the source video
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Write a JSON run summary here after a successful run
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Command-line values win over the config file.
    pub fn apply_overrides(&self, config: &mut RunConfig) {
        if let Some(input) = &self.input {
            config.input_path = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(final_output) = &self.final_output {
            config.final_output_path = final_output.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(summary) = &self.summary {
            config.summary_path = Some(summary.clone());
        }
    }
}
