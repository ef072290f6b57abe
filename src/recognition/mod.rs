//! On-screen shoot-ID recognition: sample a frame from the end of
//! playback, locate the ID overlay with template matching, read the
//! digits next to it with OCR.

pub mod frame;
pub mod metadata;
pub mod ocr;
pub mod template;

pub use frame::sample_frame;
pub use metadata::shoot_id_from_metadata;
pub use ocr::recognize_digits;
pub use template::{match_template, TemplateMatch};

use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::RecognitionConfig;
use crate::reconcile::FRAME_READ_ERROR;

/// Errors from the frame sampling stage.
#[derive(thiserror::Error, Debug)]
pub enum RecognitionError {
    #[error("video reports no frames or no frame rate: {0:?}")]
    NoFrames(PathBuf),

    #[error("no suitable overlay frame in the search window: {0:?}")]
    NoSuitableFrame(PathBuf),

    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The full frame → template → OCR pipeline with its loaded templates.
///
/// Missing template assets degrade recognition to a no-op instead of
/// failing the batch.
pub struct ShootIdRecognizer {
    templates: Vec<GrayImage>,
    cfg: RecognitionConfig,
}

impl ShootIdRecognizer {
    /// Load overlay templates from the configured directory. Template
    /// priority is the lexicographic file order, newest overlay style
    /// first by convention.
    pub fn load(cfg: RecognitionConfig) -> Self {
        let mut paths: Vec<PathBuf> = match std::fs::read_dir(&cfg.template_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("png") | Some("jpeg") | Some("jpg")
                    )
                })
                .collect(),
            Err(e) => {
                warn!(
                    "No overlay templates at {}: {}; frame recognition disabled",
                    cfg.template_dir.display(),
                    e
                );
                Vec::new()
            }
        };
        paths.sort();

        let templates: Vec<GrayImage> = paths
            .iter()
            .filter_map(|p| match image::open(p) {
                Ok(img) => Some(img.to_luma8()),
                Err(e) => {
                    warn!("Skipping unreadable template {}: {}", p.display(), e);
                    None
                }
            })
            .collect();

        if templates.is_empty() {
            warn!("No usable overlay templates, frame recognition is a no-op");
        } else {
            debug!("Loaded {} overlay template(s)", templates.len());
        }

        Self { templates, cfg }
    }

    /// Build a recognizer from in-memory templates.
    pub fn with_templates(templates: Vec<GrayImage>, cfg: RecognitionConfig) -> Self {
        Self { templates, cfg }
    }

    pub fn has_templates(&self) -> bool {
        !self.templates.is_empty()
    }

    /// Recognize the shoot ID shown in the overlay at the end of the video.
    ///
    /// Returns the candidate-set encoding: -1 when the file could not be
    /// read, 0 when nothing matched or the digits were unreadable, the ID
    /// otherwise. Never errors; every failure degrades to "no information".
    pub async fn recognize(&self, path: &Path) -> i64 {
        if self.templates.is_empty() {
            return 0;
        }

        let red_frame = match sample_frame(path, &self.cfg).await {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Frame sampling failed for {}: {}", path.display(), e);
                return FRAME_READ_ERROR;
            }
        };

        let Some(hit) = match_template(&red_frame, &self.templates, &self.cfg) else {
            debug!("No overlay template matched for {}", path.display());
            return 0;
        };

        // The digits sit immediately right of the matched overlay,
        // vertically aligned with it.
        let crop_x = hit.x + hit.width;
        if crop_x >= red_frame.width() {
            return 0;
        }
        let crop = image::imageops::crop_imm(
            &red_frame,
            crop_x,
            hit.y,
            red_frame.width() - crop_x,
            hit.height,
        )
        .to_image();

        let shoot_id = recognize_digits(&crop).await;
        if shoot_id == 0 {
            debug!("OCR could not read digits for {}", path.display());
        }
        shoot_id as i64
    }
}
