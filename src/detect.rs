use std::collections::HashMap;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{Connectivity, connected_components};

/// Preprocessed single-channel frame, ready for comparison.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    gray: GrayImage,
}

impl ProcessedFrame {
    pub fn new(gray: GrayImage) -> Self {
        Self { gray }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.gray
    }
}

/// One connected region of detected change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contour {
    /// Changed pixels inside the region.
    pub area: f64,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// Result of comparing two preprocessed frames.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Sum of the retained contour areas; larger means more different.
    pub score: f64,
    pub contours: Vec<Contour>,
    /// Binary change mask after thresholding and dilation.
    pub mask: GrayImage,
}

/// Pixel-level change detection between two frames of one camera.
///
/// The calibrator and the sweep rely only on `score` growing with the
/// amount of change and on `min_area` discarding small regions before
/// scoring; implementations are otherwise free.
pub trait ChangeDetector: Sync {
    fn preprocess(&self, image: &DynamicImage) -> ProcessedFrame;

    fn compare(&self, a: &ProcessedFrame, b: &ProcessedFrame, min_area: f64) -> Comparison;
}

/// Absolute-difference detector.
///
/// Preprocessing converts to grayscale, optionally blurs, and blacks out
/// configurable border strips (timestamps and watermarks live there).
/// Comparison takes the per-pixel absolute difference, thresholds it into
/// a binary mask, dilates the mask, and labels the connected components
/// as contours.
pub struct PixelDiffDetector {
    /// Sigma for an optional gaussian blur before differencing.
    pub blur_sigma: Option<f32>,
    /// Minimum per-pixel difference counted as change.
    pub diff_threshold: u8,
    /// Chebyshev radius of the dilation applied to the change mask.
    pub dilate_radius: u8,
    /// Border strips blacked out before differencing, as percentages of
    /// the frame size: left, top, right, bottom.
    pub border_mask: [u32; 4],
}

impl Default for PixelDiffDetector {
    fn default() -> Self {
        Self {
            blur_sigma: None,
            diff_threshold: 45,
            dilate_radius: 2,
            border_mask: [5, 10, 5, 0],
        }
    }
}

impl PixelDiffDetector {
    fn mask_borders(&self, gray: &mut GrayImage) {
        if self.border_mask == [0, 0, 0, 0] {
            return;
        }
        let [left, top, right, bottom] = self.border_mask;
        let (width, height) = gray.dimensions();
        let left_px = width * left / 100;
        let right_px = width * right / 100;
        let top_px = height * top / 100;
        let bottom_px = height * bottom / 100;

        for (x, y, pixel) in gray.enumerate_pixels_mut() {
            if x < left_px || x >= width - right_px || y < top_px || y >= height - bottom_px {
                *pixel = Luma([0]);
            }
        }
    }
}

impl ChangeDetector for PixelDiffDetector {
    fn preprocess(&self, image: &DynamicImage) -> ProcessedFrame {
        let mut gray = image.to_luma8();
        if let Some(sigma) = self.blur_sigma {
            gray = gaussian_blur_f32(&gray, sigma);
        }
        self.mask_borders(&mut gray);
        ProcessedFrame::new(gray)
    }

    fn compare(&self, a: &ProcessedFrame, b: &ProcessedFrame, min_area: f64) -> Comparison {
        // Frames from one sweep share dimensions; unequal inputs are
        // compared over their overlap.
        let width = a.width().min(b.width());
        let height = a.height().min(b.height());

        let mut mask = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let pa = a.pixels().get_pixel(x, y)[0];
                let pb = b.pixels().get_pixel(x, y)[0];
                if pa.abs_diff(pb) > self.diff_threshold {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        if self.dilate_radius > 0 {
            mask = dilate(&mask, Norm::LInf, self.dilate_radius);
        }

        let contours = find_contours(&mask, min_area);
        let score = contours.iter().map(|contour| contour.area).sum();
        Comparison {
            score,
            contours,
            mask,
        }
    }
}

/// Extract connected changed regions from a binary mask, dropping regions
/// smaller than `min_area`.
fn find_contours(mask: &GrayImage, min_area: f64) -> Vec<Contour> {
    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: HashMap<u32, Contour> = HashMap::new();
    for (x, y, label) in labeled.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        regions
            .entry(label)
            .and_modify(|contour| {
                contour.area += 1.0;
                contour.min_x = contour.min_x.min(x);
                contour.min_y = contour.min_y.min(y);
                contour.max_x = contour.max_x.max(x);
                contour.max_y = contour.max_y.max(y);
            })
            .or_insert(Contour {
                area: 1.0,
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            });
    }

    let mut contours: Vec<Contour> = regions
        .into_values()
        .filter(|contour| contour.area >= min_area)
        .collect();
    contours.sort_by_key(|contour| (contour.min_y, contour.min_x));
    contours
}

/// Decode, resize and preprocess one frame.
///
/// Returns `None` when the file cannot be decoded; callers treat that as
/// a skip, never an abort.
pub fn process_file(
    detector: &dyn ChangeDetector,
    path: &Path,
    width: u32,
    height: u32,
) -> Option<ProcessedFrame> {
    let image = match image::open(path) {
        Ok(image) => image,
        Err(err) => {
            log::warn!("skipping {}: {}", path.display(), err);
            return None;
        }
    };
    let resized = image.resize_exact(width, height, FilterType::Triangle);
    Some(detector.preprocess(&resized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, level: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([level])))
    }

    fn bare_detector() -> PixelDiffDetector {
        PixelDiffDetector {
            border_mask: [0, 0, 0, 0],
            ..PixelDiffDetector::default()
        }
    }

    #[test]
    fn preprocess_keeps_dimensions() {
        let detector = PixelDiffDetector {
            blur_sigma: Some(1.5),
            ..bare_detector()
        };
        let frame = detector.preprocess(&solid(64, 48, 128));
        assert_eq!((frame.width(), frame.height()), (64, 48));
    }

    #[test]
    fn preprocess_masks_borders() {
        let detector = PixelDiffDetector::default();
        let frame = detector.preprocess(&solid(100, 100, 255));

        // left 5% and top 10% are blacked out, the center is untouched
        assert_eq!(frame.pixels().get_pixel(0, 50)[0], 0);
        assert_eq!(frame.pixels().get_pixel(50, 5)[0], 0);
        assert_eq!(frame.pixels().get_pixel(97, 50)[0], 0);
        assert_eq!(frame.pixels().get_pixel(50, 50)[0], 255);
        assert_eq!(frame.pixels().get_pixel(50, 99)[0], 255);
    }

    #[test]
    fn identical_frames_score_zero() {
        let detector = bare_detector();
        let a = detector.preprocess(&solid(64, 64, 80));
        let b = detector.preprocess(&solid(64, 64, 80));

        let comparison = detector.compare(&a, &b, 0.0);
        assert_eq!(comparison.score, 0.0);
        assert!(comparison.contours.is_empty());
    }

    #[test]
    fn changed_block_becomes_one_contour() {
        let detector = bare_detector();
        let base = detector.preprocess(&solid(64, 64, 50));

        let mut changed = GrayImage::from_pixel(64, 64, Luma([50]));
        for y in 20..30 {
            for x in 20..30 {
                changed.put_pixel(x, y, Luma([200]));
            }
        }
        let changed = detector.preprocess(&DynamicImage::ImageLuma8(changed));

        let comparison = detector.compare(&base, &changed, 0.0);
        assert_eq!(comparison.contours.len(), 1);

        let contour = comparison.contours[0];
        assert!(contour.area >= 100.0);
        assert!(contour.min_x <= 20 && contour.max_x >= 29);
        assert!(contour.min_y <= 20 && contour.max_y >= 29);
        assert_eq!(comparison.score, contour.area);
    }

    #[test]
    fn small_regions_filtered_by_min_area() {
        let detector = bare_detector();
        let base = detector.preprocess(&solid(64, 64, 50));

        let mut changed = GrayImage::from_pixel(64, 64, Luma([50]));
        for y in 20..30 {
            for x in 20..30 {
                changed.put_pixel(x, y, Luma([200]));
            }
        }
        let changed = detector.preprocess(&DynamicImage::ImageLuma8(changed));

        // a 10x10 block dilated by 2 cannot reach 500 pixels
        let comparison = detector.compare(&base, &changed, 500.0);
        assert!(comparison.contours.is_empty());
        assert_eq!(comparison.score, 0.0);
    }

    #[test]
    fn differences_below_pixel_threshold_ignored() {
        let detector = bare_detector();
        let a = detector.preprocess(&solid(64, 64, 100));
        let b = detector.preprocess(&solid(64, 64, 130));

        let comparison = detector.compare(&a, &b, 0.0);
        assert_eq!(comparison.score, 0.0);
    }
}
