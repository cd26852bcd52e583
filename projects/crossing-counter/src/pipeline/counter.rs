use crate::pipeline::detection::{Detection, Detector};
use crate::pipeline::geometry::CountingRegion;
use crate::pipeline::tracker::{IouTracker, Track};
use crate::pipeline::types::CountState;
use crate::run_artifacts::{Point, RegionSpec};
use anyhow::Result;
use opencv::core::{Mat, Point as CvPoint, Rect, Scalar, Vector};
use opencv::imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8};
use std::collections::HashSet;

/// Counts objects crossing a region.
///
/// Returns the frame annotated with whatever the implementation tracks, and a
/// snapshot of the cumulative counts. Counts never decrease within a run.
pub trait Counter {
    fn count(&mut self, frame: Mat, region: &RegionSpec) -> Result<(Mat, CountState)>;
}

/// Detection filtering and tracking settings for [`ObjectCounter`].
#[derive(Debug, Clone)]
pub struct CounterSettings {
    /// COCO class ids to keep. Empty keeps everything.
    pub target_classes: Vec<usize>,
    pub min_confidence: f32,
    pub iou_threshold: f32,
    pub max_lost_frames: u32,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            target_classes: Vec::new(),
            min_confidence: 0.25,
            iou_threshold: 0.3,
            max_lost_frames: 30,
        }
    }
}

/// Detect → track → count, with each track counted at most once.
pub struct ObjectCounter<D: Detector> {
    detector: D,
    tracker: IouTracker,
    settings: CounterSettings,
    counted_ids: HashSet<u32>,
    counts: CountState,
    region_warned: bool,
}

impl<D: Detector> ObjectCounter<D> {
    pub fn new(detector: D, settings: CounterSettings) -> Self {
        Self {
            detector,
            tracker: IouTracker::new(settings.iou_threshold, settings.max_lost_frames),
            settings,
            counted_ids: HashSet::new(),
            counts: CountState::default(),
            region_warned: false,
        }
    }

    pub fn counts(&self) -> CountState {
        self.counts
    }

    fn keep(&self, detection: &Detection) -> bool {
        detection.confidence >= self.settings.min_confidence
            && (self.settings.target_classes.is_empty()
                || self.settings.target_classes.contains(&detection.class_id))
    }
}

impl<D: Detector> Counter for ObjectCounter<D> {
    fn count(&mut self, mut frame: Mat, region: &RegionSpec) -> Result<(Mat, CountState)> {
        let detections: Vec<Detection> = self
            .detector
            .detect(&frame)?
            .into_iter()
            .filter(|d| self.keep(d))
            .collect();
        let tracks = self.tracker.update(&detections);
        tracing::debug!(
            "{} detections, {} live tracks",
            detections.len(),
            self.tracker.active_tracks()
        );

        let counting_region = CountingRegion::from_points(&region.points);
        if counting_region.is_none() && !self.region_warned {
            tracing::warn!(
                "Region has {} point(s); nothing will be counted",
                region.points.len()
            );
            self.region_warned = true;
        }

        if let Some(counting_region) = &counting_region {
            for track in &tracks {
                if self.counted_ids.contains(&track.id) {
                    continue;
                }
                let Some(previous) = track.previous_center else {
                    continue;
                };
                if let Some(direction) = counting_region.crossing(previous, track.center()) {
                    direction.apply(&mut self.counts);
                    self.counted_ids.insert(track.id);
                    tracing::debug!("Track {} counted as {:?}", track.id, direction);
                }
            }
            draw_region(&mut frame, &counting_region.outline())?;
        }

        for track in &tracks {
            draw_track(&mut frame, track, self.counted_ids.contains(&track.id))?;
        }

        Ok((frame, self.counts))
    }
}

fn to_cv(p: &Point) -> CvPoint {
    CvPoint::new(p.x.round() as i32, p.y.round() as i32)
}

fn draw_region(frame: &mut Mat, outline: &[Point]) -> Result<()> {
    let color = Scalar::new(255.0, 0.0, 255.0, 0.0); // Magenta
    let pts: Vector<CvPoint> = outline.iter().map(to_cv).collect();
    let mut contours = Vector::<Vector<CvPoint>>::new();
    contours.push(pts);
    imgproc::polylines(frame, &contours, false, color, 4, LINE_8, 0)?;
    Ok(())
}

fn draw_track(frame: &mut Mat, track: &Track, counted: bool) -> Result<()> {
    let color = if counted {
        Scalar::new(0.0, 255.0, 0.0, 0.0) // Green
    } else {
        Scalar::new(0.0, 0.0, 255.0, 0.0) // Red
    };

    let rect = Rect::new(
        track.bbox.x as i32,
        track.bbox.y as i32,
        track.bbox.w as i32,
        track.bbox.h as i32,
    );
    imgproc::rectangle(frame, rect, color, 2, LINE_8, 0)?;

    let label = match &track.class_name {
        Some(name) => format!("{} #{}", name, track.id),
        None => format!("#{}", track.id),
    };
    let origin = CvPoint::new(rect.x, (rect.y - 8).max(12));
    imgproc::put_text(
        frame,
        &label,
        origin,
        FONT_HERSHEY_SIMPLEX,
        0.6,
        color,
        2,
        LINE_8,
        false,
    )?;
    Ok(())
}
