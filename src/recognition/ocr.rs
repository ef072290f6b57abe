//! Digit recognition for the cropped overlay region.

use image::{GrayImage, Luma};
use tracing::debug;

/// Read a non-negative integer out of the cropped digit field.
///
/// The crop is binarized for contrast, then handed to digit-only
/// tesseract. Unreadable input yields 0, never an error: "no digits" is
/// an absence of information, not a failure.
pub async fn recognize_digits(crop: &GrayImage) -> u64 {
    let binary = binarize(crop, 128);

    let Ok(temp_dir) = tempfile::tempdir() else {
        return 0;
    };
    let image_path = temp_dir.path().join("digits.png");
    if binary.save(&image_path).is_err() {
        return 0;
    }
    let Some(image_str) = image_path.to_str() else {
        return 0;
    };

    let output = match tokio::process::Command::new("tesseract")
        .args([image_str, "stdout", "digits"])
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            debug!("tesseract not runnable: {}", e);
            return 0;
        }
    };

    parse_digit_output(&String::from_utf8_lossy(&output.stdout))
}

/// Map every pixel above the threshold to white, the rest to black.
fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] >= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Strip whitespace and accept the output only when it is all digits.
fn parse_digit_output(raw: &str) -> u64 {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    cleaned.parse().unwrap_or(0)
}
