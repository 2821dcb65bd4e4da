use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use rayon::prelude::*;
use thiserror::Error;

use crate::calibrate::CalibratedParams;
use crate::config::SweepConfig;
use crate::detect::{ChangeDetector, process_file};
use crate::frame::{FrameFile, list_frames};
use crate::history::{HistoryLog, RemovalRecord};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid sweep path: {path}")]
    InvalidPath { path: String },
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Removed paths (or paths that would have been removed under
    /// dry-run), grouped by camera in order of first appearance,
    /// deletion order within each camera.
    pub removed: Vec<PathBuf>,
    pub comparisons: u64,
    pub skipped_decode: u64,
    pub failed_removals: u64,
    pub dry_run: bool,
}

/// Fixed-anchor window sweep over one folder.
///
/// Each surviving frame becomes the anchor for up to `window` following
/// frames of the same camera, window positions counted in the global
/// sorted sequence. Candidates scoring below the threshold are deleted.
/// The anchor is not refreshed after a deletion, so a slowly drifting
/// scene collapses onto the first frame of the run.
pub struct Deduplicator<'a> {
    config: SweepConfig,
    detector: &'a dyn ChangeDetector,
    progress: Option<ProgressBar>,
    dry_run: bool,
}

impl<'a> Deduplicator<'a> {
    pub fn new(config: SweepConfig, detector: &'a dyn ChangeDetector) -> Self {
        Self {
            config,
            detector,
            progress: None,
            dry_run: false,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sweep `folder`, deleting frames judged too similar to an anchor.
    ///
    /// Camera groups are independent (cross-camera comparisons never
    /// happen), so they are swept in parallel; within a group everything
    /// stays sequential and each group only deletes its own files.
    pub fn sweep(
        &self,
        folder: &Path,
        params: CalibratedParams,
    ) -> Result<SweepReport, SweepError> {
        if !folder.is_dir() {
            return Err(SweepError::InvalidPath {
                path: folder.display().to_string(),
            });
        }

        let frames = list_frames(folder);
        let groups = camera_groups(&frames);
        if let Some(progress) = &self.progress {
            progress.set_length(groups.iter().map(|group| group.len() as u64).sum());
        }

        let history = HistoryLog::new(folder);
        let outcomes: Vec<SweepReport> = groups
            .par_iter()
            .map(|group| self.sweep_group(&frames, group, params, &history))
            .collect();

        let mut report = SweepReport {
            dry_run: self.dry_run,
            ..SweepReport::default()
        };
        for outcome in outcomes {
            report.removed.extend(outcome.removed);
            report.comparisons += outcome.comparisons;
            report.skipped_decode += outcome.skipped_decode;
            report.failed_removals += outcome.failed_removals;
        }

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        Ok(report)
    }

    fn sweep_group(
        &self,
        frames: &[FrameFile],
        group: &[usize],
        params: CalibratedParams,
        history: &HistoryLog,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let mut deleted: HashSet<usize> = HashSet::new();

        for (position, &anchor_index) in group.iter().enumerate() {
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            if deleted.contains(&position) {
                continue;
            }

            let anchor = &frames[anchor_index];
            let Some(anchor_processed) = process_file(
                self.detector,
                &anchor.path,
                self.config.resize_width,
                self.config.resize_height,
            ) else {
                report.skipped_decode += 1;
                continue;
            };

            let window_end = anchor_index + self.config.window;
            for (offset, &candidate_index) in group[position + 1..].iter().enumerate() {
                if candidate_index > window_end {
                    break;
                }
                let candidate_position = position + 1 + offset;
                if deleted.contains(&candidate_position) {
                    continue;
                }

                let candidate = &frames[candidate_index];
                let Some(candidate_processed) = process_file(
                    self.detector,
                    &candidate.path,
                    self.config.resize_width,
                    self.config.resize_height,
                ) else {
                    report.skipped_decode += 1;
                    continue;
                };

                let comparison = self.detector.compare(
                    &anchor_processed,
                    &candidate_processed,
                    params.min_contour_area,
                );
                report.comparisons += 1;

                if comparison.score < params.threshold {
                    let removed =
                        self.remove(anchor, candidate, comparison.score, params.threshold, history);
                    if removed {
                        deleted.insert(candidate_position);
                        report.removed.push(candidate.path.clone());
                    } else {
                        report.failed_removals += 1;
                    }
                }
            }
        }
        report
    }

    fn remove(
        &self,
        anchor: &FrameFile,
        candidate: &FrameFile,
        score: f64,
        threshold: f64,
        history: &HistoryLog,
    ) -> bool {
        if self.dry_run {
            log::info!(
                "would remove {} (score {:.3} < {:.3}, anchor {})",
                candidate.path.display(),
                score,
                threshold,
                anchor.file_name
            );
            return true;
        }
        match fs::remove_file(&candidate.path) {
            Ok(()) => {
                log::info!(
                    "removed {} (score {:.3} < {:.3}, anchor {})",
                    candidate.path.display(),
                    score,
                    threshold,
                    anchor.file_name
                );
                history.append(&RemovalRecord::new(
                    &anchor.path,
                    &candidate.path,
                    score,
                    threshold,
                ));
                true
            }
            Err(err) => {
                log::warn!("failed to remove {}: {}", candidate.path.display(), err);
                false
            }
        }
    }
}

/// Group frame indices by camera id, keeping the first-appearance order
/// of cameras and ascending sequence indices inside each group.
///
/// Frames without a camera id cannot be paired and are left out of every
/// group.
fn camera_groups(frames: &[FrameFile]) -> Vec<Vec<usize>> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_camera: HashMap<&str, Vec<usize>> = HashMap::new();

    for (index, frame) in frames.iter().enumerate() {
        match frame.camera() {
            Some(camera) => {
                by_camera
                    .entry(camera)
                    .or_insert_with(|| {
                        order.push(camera);
                        Vec::new()
                    })
                    .push(index);
            }
            None => {
                log::debug!("{}: no camera id, excluded from sweep", frame.file_name);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|camera| by_camera.remove(camera))
        .collect()
}
