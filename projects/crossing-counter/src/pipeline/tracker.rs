// Greedy IoU multi-object tracker
//
// Associates each frame's detections with existing tracks by overlap. Enough
// to give the crossing rule a stable id and a previous position per object.

use crate::pipeline::detection::Detection;
use crate::run_artifacts::{BBox, Point};

/// A live track after the latest update.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: BBox,
    pub class_id: usize,
    pub class_name: Option<String>,
    /// Centre of the box in the previous frame this track was seen.
    pub previous_center: Option<Point>,
    /// Consecutive frames without a matching detection.
    pub frames_lost: u32,
}

impl Track {
    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: u32,
    iou_threshold: f32,
    max_lost_frames: u32,
}

impl IouTracker {
    pub fn new(iou_threshold: f32, max_lost_frames: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            iou_threshold,
            max_lost_frames,
        }
    }

    /// Updates tracks with this frame's detections and returns the tracks
    /// matched or created on this frame.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        // All candidate pairs above threshold, best overlap first.
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                if track.class_id != det.class_id {
                    continue;
                }
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.iou_threshold {
                    pairs.push((ti, di, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];
        let mut current = Vec::with_capacity(detections.len());

        for (ti, di, _) in pairs {
            if track_matched[ti] || det_matched[di] {
                continue;
            }
            track_matched[ti] = true;
            det_matched[di] = true;

            let track = &mut self.tracks[ti];
            track.previous_center = Some(track.center());
            track.bbox = detections[di].bbox;
            track.frames_lost = 0;
            current.push(track.clone());
        }

        for (ti, track) in self.tracks.iter_mut().enumerate() {
            if !track_matched[ti] {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        for (di, det) in detections.iter().enumerate() {
            if det_matched[di] {
                continue;
            }
            let track = Track {
                id: self.next_id,
                bbox: det.bbox,
                class_id: det.class_id,
                class_name: det.class_name.clone(),
                previous_center: None,
                frames_lost: 0,
            };
            self.next_id += 1;
            current.push(track.clone());
            self.tracks.push(track);
        }

        current
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32) -> Detection {
        Detection {
            bbox: BBox {
                x,
                y,
                w: 40.0,
                h: 40.0,
            },
            confidence: 0.9,
            class_id: 14,
            class_name: Some("bird".to_string()),
        }
    }

    #[test]
    fn test_ids_persist_across_frames() {
        let mut tracker = IouTracker::new(0.3, 30);

        let first = tracker.update(&[det(100.0, 100.0), det(400.0, 100.0)]);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.previous_center.is_none()));

        let second = tracker.update(&[det(405.0, 102.0), det(104.0, 101.0)]);
        let moved = second.iter().find(|t| t.id == first[0].id).unwrap();
        assert_eq!(moved.previous_center, Some(Point::new(120.0, 120.0)));
        assert_eq!(moved.bbox.x, 104.0);
        assert_eq!(tracker.active_tracks(), 2);
    }

    #[test]
    fn test_unmatched_detection_gets_new_id() {
        let mut tracker = IouTracker::new(0.3, 30);
        let first = tracker.update(&[det(100.0, 100.0)]);
        let second = tracker.update(&[det(900.0, 900.0)]);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(tracker.active_tracks(), 2);
    }

    #[test]
    fn test_tracks_expire_after_max_lost() {
        let mut tracker = IouTracker::new(0.3, 2);
        tracker.update(&[det(100.0, 100.0)]);
        tracker.update(&[]);
        tracker.update(&[]);
        assert_eq!(tracker.active_tracks(), 1);
        tracker.update(&[]);
        assert_eq!(tracker.active_tracks(), 0);
    }

    #[test]
    fn test_other_classes_do_not_match() {
        let mut tracker = IouTracker::new(0.3, 30);
        let first = tracker.update(&[det(100.0, 100.0)]);
        let mut other = det(100.0, 100.0);
        other.class_id = 0;
        let second = tracker.update(&[other]);
        assert_ne!(first[0].id, second[0].id);
    }
}
