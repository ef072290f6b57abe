//! Shoot-ID extraction from embedded container metadata.
//!
//! Some catalog encodes of a certain era carry their original file name
//! in the format title tag, e.g. `"Site 7675.mp4"`. Anything else yields
//! no information.

use std::path::Path;

/// Read the shoot ID out of the format title tag, 0 when absent or
/// unparsable.
pub async fn shoot_id_from_metadata(path: &Path) -> u64 {
    let Some(path_str) = path.to_str() else {
        return 0;
    };

    let output = match tokio::process::Command::new("ffprobe")
        .args(["-show_format", "-v", "quiet", "-of", "json", path_str])
        .output()
        .await
    {
        Ok(output) if output.status.success() => output,
        _ => return 0,
    };

    let Ok(data) = serde_json::from_slice::<serde_json::Value>(&output.stdout) else {
        return 0;
    };

    data["format"]["tags"]["title"]
        .as_str()
        .map(parse_title_tag)
        .unwrap_or(0)
}

/// `"... <id>.<ext>"` - the last whitespace token before the first dot.
fn parse_title_tag(title: &str) -> u64 {
    title
        .split('.')
        .next()
        .and_then(|stem| stem.split_whitespace().last())
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}
