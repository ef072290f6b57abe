//! Overlay template matching via normalized cross-correlation.

use image::imageops::FilterType;
use image::GrayImage;
use tracing::debug;

use crate::config::RecognitionConfig;

/// Where a template matched, in frame coordinates, at the scaled
/// template size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f64,
}

/// Correlation runs at a reduced working height; exhaustive NCC on a
/// full-HD frame would cost billions of multiplications per template.
const MATCH_HEIGHT: u32 = 270;

/// Try the templates in priority order against the red-channel frame.
///
/// Templates are authored against a 720p-height reference frame and are
/// scaled by `frame_height / reference_height` before matching, so the
/// match is resolution independent. Frames taller than the working
/// height are downscaled together with the templates and the hit is
/// mapped back to full-frame coordinates. The best location of the
/// first template scoring at least the configured threshold wins.
pub fn match_template(
    frame: &GrayImage,
    templates: &[GrayImage],
    cfg: &RecognitionConfig,
) -> Option<TemplateMatch> {
    let scale = frame.height() as f64 / cfg.reference_height;
    let work = (MATCH_HEIGHT as f64 / frame.height() as f64).min(1.0);

    let work_frame;
    let search: &GrayImage = if work < 1.0 {
        let width = ((frame.width() as f64 * work).round() as u32).max(1);
        let height = ((frame.height() as f64 * work).round() as u32).max(1);
        work_frame = image::imageops::resize(frame, width, height, FilterType::Triangle);
        &work_frame
    } else {
        frame
    };

    for template in templates {
        let width = ((template.width() as f64 * scale * work).round() as u32).max(1);
        let height = ((template.height() as f64 * scale * work).round() as u32).max(1);
        let scaled = image::imageops::resize(template, width, height, FilterType::Triangle);

        if let Some(hit) = best_correlation(search, &scaled) {
            if hit.score >= cfg.match_threshold {
                let hit = upscale_hit(hit, work, frame);
                debug!(
                    "Template matched at ({}, {}) with score {:.3}",
                    hit.x, hit.y, hit.score
                );
                return Some(hit);
            }
            debug!("Best template score {:.3} below threshold", hit.score);
        }
    }

    None
}

/// Map a working-resolution hit back onto the full frame, clamped to
/// its bounds.
fn upscale_hit(hit: TemplateMatch, work: f64, frame: &GrayImage) -> TemplateMatch {
    if work >= 1.0 {
        return hit;
    }
    let x = ((hit.x as f64 / work).round() as u32).min(frame.width().saturating_sub(1));
    let y = ((hit.y as f64 / work).round() as u32).min(frame.height().saturating_sub(1));
    TemplateMatch {
        x,
        y,
        width: ((hit.width as f64 / work).round() as u32).min(frame.width() - x),
        height: ((hit.height as f64 / work).round() as u32).min(frame.height() - y),
        score: hit.score,
    }
}

/// Exhaustive zero-mean normalized cross-correlation; returns the best
/// scoring location.
fn best_correlation(frame: &GrayImage, template: &GrayImage) -> Option<TemplateMatch> {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.dimensions();
    if tw > fw || th > fh || tw == 0 || th == 0 {
        return None;
    }

    let n = (tw * th) as f64;
    let tpl: Vec<f64> = template.pixels().map(|p| p.0[0] as f64).collect();
    let tpl_mean = tpl.iter().sum::<f64>() / n;
    let tpl_centered: Vec<f64> = tpl.iter().map(|v| v - tpl_mean).collect();
    let tpl_norm_sq: f64 = tpl_centered.iter().map(|v| v * v).sum();
    if tpl_norm_sq == 0.0 {
        return None;
    }

    let mut best: Option<TemplateMatch> = None;

    for y in 0..=(fh - th) {
        for x in 0..=(fw - tw) {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            let mut cross = 0.0;

            for ty in 0..th {
                for tx in 0..tw {
                    let v = frame.get_pixel(x + tx, y + ty).0[0] as f64;
                    sum += v;
                    sum_sq += v * v;
                    cross += v * tpl_centered[(ty * tw + tx) as usize];
                }
            }

            let window_var = sum_sq - sum * sum / n;
            if window_var <= 0.0 {
                continue;
            }

            // Template values are already centered, so `cross` is the
            // zero-mean numerator.
            let score = cross / (window_var * tpl_norm_sq).sqrt();

            if best.map_or(true, |b| score > b.score) {
                best = Some(TemplateMatch {
                    x,
                    y,
                    width: tw,
                    height: th,
                    score,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checker(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if (x + y) % 2 == 0 { 230 } else { 20 }])
        })
    }

    fn cfg() -> RecognitionConfig {
        RecognitionConfig {
            // Tests run on synthetic frames of arbitrary size; match 1:1
            reference_height: 48.0,
            ..RecognitionConfig::default()
        }
    }

    #[test]
    fn test_embedded_template_is_found() {
        let template = checker(8, 6);
        let mut frame = GrayImage::from_pixel(64, 48, Luma([40]));
        image::imageops::overlay(&mut frame, &template, 20, 10);

        let hit = match_template(&frame, &[template], &cfg()).expect("template should match");
        assert_eq!((hit.x, hit.y), (20, 10));
        assert_eq!((hit.width, hit.height), (8, 6));
        assert!(hit.score > 0.99);
    }

    #[test]
    fn test_low_score_yields_no_match() {
        // Uniform noise-free frame never correlates with a checker
        let template = checker(8, 6);
        let frame = GrayImage::from_fn(64, 48, |x, _| Luma([(x * 3 % 255) as u8]));
        assert!(match_template(&frame, &[template], &cfg()).is_none());
    }

    #[test]
    fn test_older_template_styles_are_tried_in_order() {
        let current = checker(8, 6);
        // Inverted checker, as an older overlay style
        let older = GrayImage::from_fn(8, 6, |x, y| Luma([if (x + y) % 2 == 0 { 20 } else { 230 }]));

        let mut frame = GrayImage::from_pixel(64, 48, Luma([40]));
        image::imageops::overlay(&mut frame, &older, 30, 20);

        let hit = match_template(&frame, &[current, older], &cfg()).expect("fallback should match");
        assert_eq!((hit.x, hit.y), (30, 20));
    }

    #[test]
    fn test_tall_frames_are_matched_at_working_resolution() {
        // 4-px blocks survive the downscale to the working height
        let template = GrayImage::from_fn(16, 12, |x, y| {
            Luma([if ((x / 4) + (y / 4)) % 2 == 0 { 230 } else { 20 }])
        });
        let mut frame = GrayImage::from_pixel(800, 540, Luma([40]));
        image::imageops::overlay(&mut frame, &template, 200, 100);

        let cfg = RecognitionConfig {
            reference_height: 540.0,
            ..RecognitionConfig::default()
        };
        let hit = match_template(&frame, &[template], &cfg).expect("template should match");
        // Coordinates come back in full-frame space, within downscale rounding
        assert!((hit.x as i64 - 200).abs() <= 4, "x was {}", hit.x);
        assert!((hit.y as i64 - 100).abs() <= 4, "y was {}", hit.y);
        assert!(hit.score > 0.8);
    }

    #[test]
    fn test_template_larger_than_frame() {
        let template = checker(100, 100);
        let frame = checker(32, 32);
        assert!(match_template(&frame, &[template], &cfg()).is_none());
    }
}
