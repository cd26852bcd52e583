use crate::pipeline::convert::TranscodeSettings;
use crate::pipeline::counter::CounterSettings;
use crate::pipeline::overlay::OverlayStyle;
use crate::run_artifacts::{OverlayBox, Point, RegionSpec};
use crate::video::Backend;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything one run needs. Every field has a default, so an empty JSON
/// object is a valid config.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub input_path: PathBuf,
    /// Intermediate video written frame by frame
    pub output_path: PathBuf,
    /// Delivery video produced by the transcoder
    pub final_output_path: PathBuf,
    /// FourCC for the intermediate container
    pub intermediate_codec: String,
    pub region_points: RegionSpec,
    pub model_path: String,
    /// COCO class ids to count. Empty counts every class.
    pub target_classes: Vec<usize>,
    pub min_confidence: f32,
    pub max_lost_frames: u32,
    pub overlay_box: OverlayBox,
    pub overlay_font_scale: f64,
    /// BGR
    pub overlay_color: [u8; 3],
    /// BGR
    pub overlay_background: [u8; 3],
    pub overlay_thickness: i32,
    pub backend: Backend,
    pub transcoder: TranscodeSettings,
    pub summary_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let style = OverlayStyle::default();
        let counter = CounterSettings::default();
        Self {
            input_path: PathBuf::from("../input_videos/birds_3840_2160_25fps.mp4"),
            output_path: PathBuf::from("../output_videos/object_counting_output.avi"),
            final_output_path: PathBuf::from("../output_videos/object_counting_output.mp4"),
            intermediate_codec: "mp4v".to_string(),
            region_points: RegionSpec::new(vec![
                Point::new(2300.0, 20.0),
                Point::new(2300.0, 2100.0),
            ]),
            model_path: "models/rtdetr-v2-s.onnx".to_string(),
            target_classes: vec![14], // bird
            min_confidence: counter.min_confidence,
            max_lost_frames: counter.max_lost_frames,
            overlay_box: OverlayBox {
                x: 3540,
                y: 20,
                w: 230,
                h: 120,
            },
            overlay_font_scale: style.font_scale,
            overlay_color: style.text_color,
            overlay_background: style.background_color,
            overlay_thickness: style.thickness,
            backend: Backend::default(),
            transcoder: TranscodeSettings::default(),
            summary_path: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// Rejects settings no run could succeed with. Region geometry is only
    /// checked for emptiness; odd point counts are left to the counter.
    pub fn validate(&self) -> Result<()> {
        if self.region_points.points.is_empty() {
            bail!("region_points must contain at least one point");
        }
        let b = &self.overlay_box;
        if b.w <= 0 || b.h <= 0 {
            bail!("overlay_box must have positive size, got {}x{}", b.w, b.h);
        }
        if self.overlay_font_scale.is_nan() || self.overlay_font_scale <= 0.0 {
            bail!(
                "overlay_font_scale must be positive, got {}",
                self.overlay_font_scale
            );
        }
        if self.overlay_thickness <= 0 {
            bail!(
                "overlay_thickness must be positive, got {}",
                self.overlay_thickness
            );
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            bail!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            );
        }
        if self.intermediate_codec.chars().count() != 4 {
            bail!(
                "intermediate_codec must be a 4-character FourCC, got {:?}",
                self.intermediate_codec
            );
        }
        if self.transcoder.program.trim().is_empty() {
            bail!("transcoder.program must not be empty");
        }
        Ok(())
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            font_scale: self.overlay_font_scale,
            text_color: self.overlay_color,
            background_color: self.overlay_background,
            thickness: self.overlay_thickness,
        }
    }

    pub fn counter_settings(&self) -> CounterSettings {
        CounterSettings {
            target_classes: self.target_classes.clone(),
            min_confidence: self.min_confidence,
            max_lost_frames: self.max_lost_frames,
            ..CounterSettings::default()
        }
    }
}
