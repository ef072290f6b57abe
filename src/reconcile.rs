//! Agreement and tie-break policy across the three shoot-ID sources.
//!
//! Frame and metadata extraction are far less ambiguous than filename
//! parsing, so they disambiguate first and, when present, decide outright.

use tracing::{debug, warn};

/// Frame recognizer could not read the video at all.
pub const FRAME_READ_ERROR: i64 = -1;

/// Independent shoot-ID guesses for one file.
///
/// `from_frame` encodes the recognizer outcome: -1 read error, 0 no match,
/// positive values are a recognized ID.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub from_filename: Vec<u64>,
    pub from_frame: i64,
    pub from_metadata: u64,
}

/// Outcome of reconciliation. Ambiguity is a value, not a prompt: the
/// interactive boundary decides how to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { shoot_id: u64, confident: bool },
    Ambiguous { candidates: Vec<u64> },
}

/// Combine the candidate sources into one decision.
pub fn reconcile(candidates: &CandidateSet) -> Resolution {
    let frame = candidates.from_frame;
    let frame_id = if frame > 0 { frame as u64 } else { 0 };
    let metadata_id = candidates.from_metadata;

    let filename_id = match candidates.from_filename.len() {
        0 => None,
        1 => Some(candidates.from_filename[0]),
        _ => {
            // Multiple filename candidates: let the unambiguous sources
            // pick, frame first.
            if frame_id > 0 && candidates.from_filename.contains(&frame_id) {
                Some(frame_id)
            } else if metadata_id > 0 && candidates.from_filename.contains(&metadata_id) {
                Some(metadata_id)
            } else {
                return Resolution::Ambiguous {
                    candidates: candidates.from_filename.clone(),
                };
            }
        }
    };

    if frame_id > 0 || metadata_id > 0 {
        let shoot_id = if frame_id > 0 { frame_id } else { metadata_id };
        if let Some(from_name) = filename_id {
            if from_name != shoot_id {
                debug!(
                    "filename suggested {} but recognition found {}, trusting recognition",
                    from_name, shoot_id
                );
            }
        }
        return Resolution::Resolved {
            shoot_id,
            confident: true,
        };
    }

    let Some(shoot_id) = filename_id else {
        return Resolution::Resolved {
            shoot_id: 0,
            confident: false,
        };
    };

    // Filename only, nothing corroborates it.
    let confident = if shoot_id < 1000 {
        warn!(
            "shoot id {} is suspiciously small for an uncorroborated filename match",
            shoot_id
        );
        false
    } else if shoot_id > 8000 && frame == FRAME_READ_ERROR {
        warn!(
            "shoot id {} should carry an overlay but the file was unreadable, \
             possibly the wrong catalog or a corrupted file",
            shoot_id
        );
        false
    } else {
        // A failed recognizer read does not contradict a mid-range
        // filename candidate.
        true
    };

    Resolution::Resolved { shoot_id, confident }
}

/// Reconcile with the non-interactive tie-break applied: ambiguity resolves
/// to the largest candidate, unconfident.
pub fn reconcile_non_interactive(candidates: &CandidateSet) -> (u64, bool) {
    match reconcile(candidates) {
        Resolution::Resolved { shoot_id, confident } => (shoot_id, confident),
        Resolution::Ambiguous { candidates } => {
            let max = candidates.into_iter().max().unwrap_or(0);
            (max, false)
        }
    }
}
