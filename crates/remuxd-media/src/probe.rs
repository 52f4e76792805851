//! FFprobe duration probing for disc titles.

use std::path::Path;
use std::process::Stdio;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the playback duration of one playlist in a disc source, in seconds.
///
/// Used by the worker for the progress denominator; the parsed playlist
/// duration serves as the fallback when FFprobe is unavailable.
pub async fn probe_title_duration(source_root: &Path, playlist_number: u32) -> MediaResult<f64> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-playlist",
        ])
        .arg(playlist_number.to_string())
        .arg(format!("bluray:{}", source_root.display()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for playlist {playlist_number}"),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    Ok(probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parse_from_probe_json() {
        let json = r#"{"format": {"duration": "7230.125000"}}"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let duration = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        assert!((duration - 7230.125).abs() < 0.001);
    }

    #[test]
    fn test_missing_duration_defaults_to_zero() {
        let json = r#"{"format": {}}"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert!(probe.format.duration.is_none());
    }
}
