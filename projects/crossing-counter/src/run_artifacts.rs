// Run artifact struct definitions
//
// Geometry shared by the config and the counter, plus the summary that is
// persisted as JSON at the end of a successful run.

use crate::video::VideoProperties;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A 2D point in pixel coordinates.
///
/// Accepts both `{"x": 10, "y": 20}` and `[10, 20]` when deserialized.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel bounding box with a top-left origin
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.w / 2.0,
            y: self.y + self.h / 2.0,
        }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union, 0.0 when the boxes do not overlap.
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// What a region's point count means to the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionShape {
    Line,
    Polygon,
    /// Any count other than 2 or 4. Passed through to the counter as-is.
    Irregular(usize),
}

/// Ordered points of the counting line or polygon.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct RegionSpec {
    pub points: Vec<Point>,
}

impl RegionSpec {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn shape(&self) -> RegionShape {
        match self.points.len() {
            2 => RegionShape::Line,
            4 => RegionShape::Polygon,
            n => RegionShape::Irregular(n),
        }
    }

    /// Points outside `[0, width) x [0, height)`.
    pub fn out_of_bounds(&self, properties: &VideoProperties) -> Vec<Point> {
        let w = properties.width as f32;
        let h = properties.height as f32;
        self.points
            .iter()
            .copied()
            .filter(|p| p.x < 0.0 || p.y < 0.0 || p.x >= w || p.y >= h)
            .collect()
    }
}

/// Fixed readout rectangle in pixel coordinates
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl OverlayBox {
    /// The box spans `x..=x + w` and `y..=y + h`, both corners inclusive.
    pub fn fits_within(&self, properties: &VideoProperties) -> bool {
        self.x >= 0
            && self.y >= 0
            && (self.x as i64 + self.w as i64) < properties.width as i64
            && (self.y as i64 + self.h as i64) < properties.height as i64
    }
}

/// Summary of a completed run, written as `summary_path` when configured.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunSummary {
    pub input_path: PathBuf,
    pub intermediate_path: PathBuf,
    pub final_output_path: PathBuf,
    pub properties: VideoProperties,
    pub frames_written: usize,
    pub in_count: u64,
    pub out_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write run summary to {:?}", path))?;
        tracing::info!("Run summary written to {:?}", path);
        Ok(())
    }
}
