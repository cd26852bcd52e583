use crate::run_artifacts::BBox;
use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::Mat;
use opencv::prelude::*;
use usls::models::RTDETR;
use usls::{Config, Image};

/// A single detection in frame pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: Option<String>,
}

/// Anything that can turn a BGR frame into detections.
pub trait Detector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>>;
}

/// A wrapper around the USLS RT-DETR model that handles BGR-to-RGB conversion
/// and corrects for aspect-ratio padding bugs in the underlying model library.
pub struct ObjectDetector {
    model: RTDETR,
}

impl ObjectDetector {
    /// Create a new detector with the given model path.
    pub fn new(model_path: &str) -> Result<Self> {
        let config = Config::default()
            .with_model_file(model_path)
            .with_class_names(&usls::NAMES_COCO_80);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = RTDETR::new(config)?;
        tracing::info!("ObjectDetector: loaded {}", model_path);
        Ok(Self { model })
    }
}

impl Detector for ObjectDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let dynamic_image = mat_to_dynamic_image(frame)?;

        // The model reports boxes squeezed along the longer axis.
        let size = frame.size()?;
        let img_w = size.width as f32;
        let img_h = size.height as f32;
        let (x_corr, y_corr) = if img_w > img_h {
            (img_w / img_h, 1.0)
        } else if img_h > img_w {
            (1.0, img_h / img_w)
        } else {
            (1.0, 1.0)
        };

        let results = self.model.forward(&[Image::from(dynamic_image)])?;
        let detections = results
            .into_iter()
            .next()
            .map(|y| y.hbbs)
            .unwrap_or_default()
            .into_iter()
            .map(|hbb| Detection {
                bbox: BBox {
                    x: hbb.xmin() * x_corr,
                    y: hbb.ymin() * y_corr,
                    w: hbb.width() * x_corr,
                    h: hbb.height() * y_corr,
                },
                confidence: hbb.confidence().unwrap_or(0.0),
                class_id: hbb.id().unwrap_or(0),
                class_name: hbb.name().map(|s| s.to_string()),
            })
            .collect();

        Ok(detections)
    }
}

/// Convert an OpenCV Mat (BGR) to an image::DynamicImage (RGB)
fn mat_to_dynamic_image(mat: &Mat) -> Result<DynamicImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    let img_buffer = ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, buffer)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vec3b, CV_8UC3};

    #[test]
    fn test_mat_to_dynamic_image_swaps_channels() {
        let mut mat = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::all(0.0)).unwrap();
        // Pure blue in BGR order.
        *mat.at_2d_mut::<Vec3b>(1, 2).unwrap() = Vec3b::from([255, 0, 0]);

        let image = mat_to_dynamic_image(&mat).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [0, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
