use std::path::Path;

use thiserror::Error;

use crate::config::SweepConfig;
use crate::detect::{ChangeDetector, ProcessedFrame, process_file};
use crate::frame::list_frames;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("invalid sample path: {path}")]
    InvalidPath { path: String },

    #[error("no comparable image pairs in {path}")]
    EmptySample { path: String },
}

/// Parameters derived from a sample folder, consumed by the sweep.
///
/// Computed once before any deletion and never recomputed mid-sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedParams {
    pub threshold: f64,
    pub min_contour_area: f64,
}

/// Derive sweep parameters from the frames in `sample_dir`.
///
/// Consecutive frames (in ordering-key order) are compared using the
/// seed contour-area floor; the threshold and the real floor are scaled
/// means of the observed pair scores and contour areas.
pub fn calibrate(
    sample_dir: &Path,
    config: &SweepConfig,
    detector: &dyn ChangeDetector,
) -> Result<CalibratedParams, CalibrationError> {
    if !sample_dir.is_dir() {
        return Err(CalibrationError::InvalidPath {
            path: sample_dir.display().to_string(),
        });
    }

    let frames = list_frames(sample_dir);

    let mut scores = Vec::new();
    let mut contour_areas = Vec::new();
    let mut previous: Option<ProcessedFrame> = None;

    for frame in &frames {
        let Some(processed) = process_file(
            detector,
            &frame.path,
            config.resize_width,
            config.resize_height,
        ) else {
            // undecodable: the previous-frame cursor must not advance
            continue;
        };

        if let Some(prev) = &previous {
            let comparison = detector.compare(prev, &processed, config.seed_min_area);
            scores.push(comparison.score);
            contour_areas.extend(comparison.contours.iter().map(|contour| contour.area));
        }
        previous = Some(processed);
    }

    if scores.is_empty() {
        return Err(CalibrationError::EmptySample {
            path: sample_dir.display().to_string(),
        });
    }

    let threshold = mean(&scores) * config.threshold_scale;
    let min_contour_area = if contour_areas.is_empty() {
        // A sample of static scenes legitimately produces no contours;
        // disable area filtering instead of deriving a NaN floor.
        log::warn!(
            "calibration sample {} produced no contours; contour-area floor disabled",
            sample_dir.display()
        );
        0.0
    } else {
        mean(&contour_areas) * config.area_scale
    };

    log::info!(
        "calibrated threshold {:.3} and contour-area floor {:.3} from {} pairs",
        threshold,
        min_contour_area,
        scores.len()
    );

    Ok(CalibratedParams {
        threshold,
        min_contour_area,
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
