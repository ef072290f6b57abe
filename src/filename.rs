//! Shoot-ID candidate extraction from free-text filenames.

use regex::Regex;
use tracing::debug;

use crate::config::ExtractionConfig;

/// Scan a filename for plausible shoot-ID tokens.
///
/// Runs of 2-6 digits bounded by non-digits are considered; calendar years,
/// `YYMMDD`-shaped runs, values too small to be real IDs and bare
/// video-quality markers are dropped. A run enclosed exactly in `(..)` or
/// `[..]` that is not a year is taken as deliberate and returned alone.
/// Candidates come back in left-to-right order; more than one element means
/// the filename is ambiguous.
pub fn extract_candidates(file_name: &str, cfg: &ExtractionConfig) -> Vec<u64> {
    let Ok(re) = Regex::new(r"(\D)(\d{2,6})(\D)") else {
        return Vec::new();
    };

    // Pad so runs at either end still have bounding characters.
    let padded = format!("#{}#", file_name);
    let mut candidates = Vec::new();
    let mut search_from = 0;

    while let Some(caps) = re.captures_at(&padded, search_from) {
        let (Some(left), Some(run), Some(right)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            break;
        };
        // The right bound may open the next run; continue scanning at it,
        // never inside the consumed digits.
        search_from = right.start();

        let Ok(value) = run.as_str().parse::<u64>() else {
            continue;
        };

        if (cfg.year_min..=cfg.year_max).contains(&value) {
            debug!("dropping year-like token {} in {:?}", value, file_name);
            continue;
        }

        let bracketed = (left.as_str() == "(" && right.as_str() == ")")
            || (left.as_str() == "[" && right.as_str() == "]");
        if bracketed {
            // Deliberately encased number, decisive on its own.
            return vec![value];
        }

        if looks_like_date(run.as_str()) {
            debug!("dropping date-shaped token {} in {:?}", value, file_name);
            continue;
        }

        if value < cfg.min_plausible_id {
            continue;
        }

        if cfg.quality_markers.contains(&value) {
            debug!("dropping quality marker {} in {:?}", value, file_name);
            continue;
        }

        candidates.push(value);
    }

    candidates
}

/// `YYMMDD`: two-digit year followed by a valid month and day.
fn looks_like_date(run: &str) -> bool {
    if run.len() != 6 {
        return false;
    }
    let month = run[2..4].parse::<u32>().unwrap_or(0);
    let day = run[4..6].parse::<u32>().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}
