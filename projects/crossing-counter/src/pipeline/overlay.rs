use crate::pipeline::types::CountState;
use crate::run_artifacts::OverlayBox;
use anyhow::Result;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc::{self, FILLED, FONT_HERSHEY_SIMPLEX, LINE_8};
use opencv::prelude::*;

/// Text placement inside the readout box, relative to its top-left corner.
const TEXT_INSET_X: i32 = 20;
const IN_BASELINE_Y: i32 = 40;
const OUT_BASELINE_Y: i32 = 100;

/// Fixed styling of the count readout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub font_scale: f64,
    /// BGR
    pub text_color: [u8; 3],
    /// BGR
    pub background_color: [u8; 3],
    pub thickness: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_scale: 1.3,
            text_color: [255, 255, 255],
            background_color: [0, 0, 0],
            thickness: 3,
        }
    }
}

fn bgr(color: [u8; 3]) -> Scalar {
    Scalar::new(color[0] as f64, color[1] as f64, color[2] as f64, 0.0)
}

/// Draws the "In: N" / "Out: N" readout at a fixed place on every frame.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    readout: OverlayBox,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(readout: OverlayBox, style: OverlayStyle) -> Self {
        Self { readout, style }
    }

    pub fn readout(&self) -> OverlayBox {
        self.readout
    }

    /// Part of the readout box inside a `cols` x `rows` frame, if any.
    fn visible_box(&self, cols: i32, rows: i32) -> Option<Rect> {
        let OverlayBox { x, y, w, h } = self.readout;
        let left = (x as i64).max(0);
        let top = (y as i64).max(0);
        let right = (x as i64 + w as i64).min(cols as i64 - 1);
        let bottom = (y as i64 + h as i64).min(rows as i64 - 1);
        if left > right || top > bottom {
            return None;
        }
        Some(Rect::new(
            left as i32,
            top as i32,
            (right - left + 1) as i32,
            (bottom - top + 1) as i32,
        ))
    }

    /// Only touches `frame`. Parts of the box outside the frame are clipped
    /// and text lines that would land entirely off-frame are skipped.
    /// The filled area includes the far corner, so it is `(w + 1) x (h + 1)`.
    pub fn render(&self, frame: &mut Mat, counts: CountState) -> Result<()> {
        let OverlayBox { x, y, .. } = self.readout;
        if let Some(visible) = self.visible_box(frame.cols(), frame.rows()) {
            imgproc::rectangle(
                frame,
                visible,
                bgr(self.style.background_color),
                FILLED,
                LINE_8,
                0,
            )?;
        }

        let lines = [
            (format!("In: {}", counts.in_count), IN_BASELINE_Y),
            (format!("Out: {}", counts.out_count), OUT_BASELINE_Y),
        ];
        let (cols, rows) = (frame.cols() as i64, frame.rows() as i64);
        let thickness = self.style.thickness as i64;
        for (text, baseline) in lines {
            let mut descent = 0;
            let size = imgproc::get_text_size(
                &text,
                FONT_HERSHEY_SIMPLEX,
                self.style.font_scale,
                self.style.thickness,
                &mut descent,
            )?;
            let left = x as i64 + TEXT_INSET_X as i64;
            let base = y as i64 + baseline as i64;
            // Glyphs extend right of and above the origin.
            if left >= cols
                || left + (size.width as i64) + thickness < 0
                || base - (size.height as i64) - thickness >= rows
                || base + (descent as i64) + thickness < 0
            {
                continue;
            }
            imgproc::put_text(
                frame,
                &text,
                Point::new(left as i32, base as i32),
                FONT_HERSHEY_SIMPLEX,
                self.style.font_scale,
                bgr(self.style.text_color),
                self.style.thickness,
                LINE_8,
                false,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;

    fn gray_frame() -> Mat {
        Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(128.0)).unwrap()
    }

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(
            OverlayBox {
                x: 60,
                y: 10,
                w: 230,
                h: 120,
            },
            OverlayStyle::default(),
        )
    }

    #[test]
    fn test_render_is_pixel_identical_on_copies() {
        let original = gray_frame();
        let mut a = original.clone();
        let mut b = original.clone();
        let counts = CountState {
            in_count: 12,
            out_count: 7,
        };

        renderer().render(&mut a, counts).unwrap();
        renderer().render(&mut b, counts).unwrap();

        assert_eq!(a.data_bytes().unwrap(), b.data_bytes().unwrap());
        assert_ne!(a.data_bytes().unwrap(), original.data_bytes().unwrap());
    }

    #[test]
    fn test_box_is_filled_and_outside_untouched() {
        let mut frame = gray_frame();
        renderer().render(&mut frame, CountState::default()).unwrap();

        // Corner of the box, away from any glyph.
        assert_eq!(*frame.at_2d::<Vec3b>(12, 62).unwrap(), Vec3b::from([0, 0, 0]));
        // Far bottom-right, outside the box.
        assert_eq!(
            *frame.at_2d::<Vec3b>(230, 310).unwrap(),
            Vec3b::from([128, 128, 128])
        );
    }

    #[test]
    fn test_box_includes_far_corner() {
        let mut frame = gray_frame();
        renderer().render(&mut frame, CountState::default()).unwrap();

        // Box is x 60..=290, y 10..=130.
        let black = Vec3b::from([0, 0, 0]);
        let gray = Vec3b::from([128, 128, 128]);
        assert_eq!(*frame.at_2d::<Vec3b>(130, 290).unwrap(), black);
        assert_eq!(*frame.at_2d::<Vec3b>(131, 290).unwrap(), gray);
        assert_eq!(*frame.at_2d::<Vec3b>(130, 291).unwrap(), gray);
        assert_eq!(*frame.at_2d::<Vec3b>(10, 60).unwrap(), black);
        assert_eq!(*frame.at_2d::<Vec3b>(9, 60).unwrap(), gray);
    }

    #[test]
    fn test_extreme_origin_does_not_overflow() {
        let mut frame = gray_frame();
        let original = frame.clone();
        let far = OverlayRenderer::new(
            OverlayBox {
                x: i32::MAX - 5,
                y: i32::MAX - 5,
                w: i32::MAX,
                h: i32::MAX,
            },
            OverlayStyle::default(),
        );
        assert!(far.visible_box(frame.cols(), frame.rows()).is_none());
        far.render(&mut frame, CountState::default()).unwrap();
        assert_eq!(frame.data_bytes().unwrap(), original.data_bytes().unwrap());
    }

    #[test]
    fn test_visible_box_is_clipped_to_frame() {
        let partly_off = OverlayRenderer::new(
            OverlayBox {
                x: 300,
                y: -10,
                w: 230,
                h: 120,
            },
            OverlayStyle::default(),
        );
        assert_eq!(
            partly_off.visible_box(320, 240),
            Some(Rect::new(300, 0, 20, 111))
        );
        assert_eq!(renderer().visible_box(320, 240), Some(Rect::new(60, 10, 231, 121)));
    }

    #[test]
    fn test_text_is_drawn_in_box() {
        let mut frame = gray_frame();
        renderer().render(&mut frame, CountState::default()).unwrap();

        let mut white = 0;
        for row in 10..130 {
            for col in 60..290 {
                if *frame.at_2d::<Vec3b>(row, col).unwrap() == Vec3b::from([255, 255, 255]) {
                    white += 1;
                }
            }
        }
        assert!(white > 100, "expected readout text, found {} white pixels", white);
    }

    #[test]
    fn test_box_partly_outside_frame_is_clipped() {
        let mut frame = gray_frame();
        let offscreen = OverlayRenderer::new(
            OverlayBox {
                x: 3540,
                y: 20,
                w: 230,
                h: 120,
            },
            OverlayStyle::default(),
        );
        let huge = CountState {
            in_count: u64::MAX,
            out_count: u64::MAX,
        };
        offscreen.render(&mut frame, huge).unwrap();
        assert_eq!(
            *frame.at_2d::<Vec3b>(100, 100).unwrap(),
            Vec3b::from([128, 128, 128])
        );
    }
}
