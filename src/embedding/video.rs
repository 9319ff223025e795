//! Frame sampling for video files.
//!
//! Shells out to `ffprobe` for the duration and to `ffmpeg` for each frame,
//! decoding the PNG it writes to stdout. Frames are taken at the midpoints of
//! `n` equal segments so the first and last frames (often black) are avoided.

use std::path::Path;
use std::process::Command;

use image::DynamicImage;

use crate::error::{Error, Result};

/// Duration of the video in seconds, as reported by `ffprobe`.
pub fn video_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| Error::Video(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(Error::Video(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let duration_str = String::from_utf8_lossy(&output.stdout);
    duration_str
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Video(format!("unreadable duration {:?}", duration_str.trim())))
}

/// Timestamps (seconds) at the midpoints of `n` equal segments of `duration`.
pub fn sample_timestamps(duration: f64, n: usize) -> Vec<f64> {
    if n == 0 || !duration.is_finite() || duration <= 0.0 {
        return vec![0.0];
    }
    let step = duration / n as f64;
    (0..n).map(|i| step * (i as f64 + 0.5)).collect()
}

fn frame_at(path: &Path, seconds: f64) -> Result<DynamicImage> {
    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{seconds:.3}"), "-i"])
        .arg(path)
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
        .output()
        .map_err(|e| Error::Video(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() || output.stdout.is_empty() {
        return Err(Error::Video(format!(
            "ffmpeg produced no frame at {seconds:.3}s for {}",
            path.display()
        )));
    }
    Ok(image::load_from_memory(&output.stdout)?)
}

/// Extract up to `n` evenly spaced frames. Fails only if no frame could be read.
pub fn extract_frames(path: &Path, n: usize) -> Result<Vec<DynamicImage>> {
    let duration = video_duration(path)?;
    let mut frames = Vec::with_capacity(n);
    for t in sample_timestamps(duration, n) {
        match frame_at(path, t) {
            Ok(frame) => frames.push(frame),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping frame"),
        }
    }
    if frames.is_empty() {
        return Err(Error::Video(format!(
            "no frames could be extracted from {}",
            path.display()
        )));
    }
    Ok(frames)
}
