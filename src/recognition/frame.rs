//! Frame sampling: pick a representative end-of-playback frame and
//! reduce it to its red channel, where the ID overlay is most distinct.

use image::GrayImage;
use std::path::Path;
use tracing::debug;

use super::RecognitionError;
use crate::config::RecognitionConfig;

/// Extract a red-channel frame from the final seconds of playback.
///
/// Steps backward from the last readable frame in roughly third-second
/// increments; frames that are entirely black or too busy to be a clean
/// overlay end card are rejected. Fails with `NoFrames` when the stream
/// reports no frame count or frame rate, `NoSuitableFrame` when the
/// search window is exhausted.
pub async fn sample_frame(
    path: &Path,
    cfg: &RecognitionConfig,
) -> Result<GrayImage, RecognitionError> {
    let (frame_count, fps) = probe_stream(path).await?;
    if frame_count <= 0.0 || fps <= 0.0 {
        return Err(RecognitionError::NoFrames(path.to_path_buf()));
    }

    let duration = frame_count / fps;
    let temp_dir = tempfile::tempdir()?;
    let frame_path = temp_dir.path().join("sample.png");

    // The decoder is often unable to read the very last frames, so start
    // one step before the end and walk backward through the window.
    let mut position = duration - cfg.step_secs;
    let window_start = (duration - cfg.search_window_secs).max(0.0);

    while position >= window_start {
        if let Some(frame) = decode_frame_at(path, position, &frame_path).await {
            if let Some(red) = accept_overlay_frame(&frame, cfg) {
                debug!(
                    "Accepted frame at {:.2}s of {} for recognition",
                    position,
                    path.display()
                );
                return Ok(red);
            }
        }
        position -= cfg.step_secs;
    }

    Err(RecognitionError::NoSuitableFrame(path.to_path_buf()))
}

/// ffprobe the stream for frame count and frame rate.
async fn probe_stream(path: &Path) -> Result<(f64, f64), RecognitionError> {
    let Some(path_str) = path.to_str() else {
        return Err(RecognitionError::NoFrames(path.to_path_buf()));
    };

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            path_str,
        ])
        .output()
        .await?;

    if !output.status.success() {
        return Err(RecognitionError::NoFrames(path.to_path_buf()));
    }

    let data: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|_| RecognitionError::NoFrames(path.to_path_buf()))?;

    let streams = data["streams"].as_array().cloned().unwrap_or_default();
    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .ok_or_else(|| RecognitionError::NoFrames(path.to_path_buf()))?;

    let fps = video_stream["r_frame_rate"]
        .as_str()
        .and_then(|s| {
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() == 2 {
                let num: f64 = parts[0].parse().ok()?;
                let den: f64 = parts[1].parse().ok()?;
                if den == 0.0 {
                    None
                } else {
                    Some(num / den)
                }
            } else {
                s.parse().ok()
            }
        })
        .unwrap_or(0.0);

    // nb_frames is not always populated; fall back to duration * fps
    let frame_count = video_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            let duration: f64 = data["format"]["duration"].as_str()?.parse().ok()?;
            Some(duration * fps)
        })
        .unwrap_or(0.0);

    Ok((frame_count, fps))
}

/// Decode the single frame at `position` seconds into `frame_path`.
async fn decode_frame_at(
    path: &Path,
    position: f64,
    frame_path: &Path,
) -> Option<image::RgbImage> {
    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-ss",
            &format!("{:.3}", position),
            "-i",
            path.to_str()?,
            "-frames:v",
            "1",
            "-y",
            frame_path.to_str()?,
        ])
        .status()
        .await
        .ok()?;

    if !status.success() {
        return None;
    }

    image::open(frame_path).ok().map(|img| img.to_rgb8())
}

/// Keep the frame only when it looks like a clean overlay end card:
/// nearly black with a small bright region. Returns the red channel.
fn accept_overlay_frame(frame: &image::RgbImage, cfg: &RecognitionConfig) -> Option<GrayImage> {
    let red = red_channel(frame);

    let bright = red
        .pixels()
        .filter(|p| p.0[0] > cfg.brightness_floor)
        .count();
    let total = (red.width() * red.height()) as usize;
    if total == 0 || bright == 0 {
        return None;
    }
    if bright as f64 / total as f64 > cfg.bright_pixel_limit {
        return None;
    }

    Some(red)
}

fn red_channel(frame: &image::RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        image::Luma([frame.get_pixel(x, y).0[0]])
    })
}
