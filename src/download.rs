// src/download.rs

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Fetch the source video with yt-dlp and return the saved file path.
pub fn download_youtube(url: &str, out_dir: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let output_file = Path::new(out_dir).join("traffic.mp4");

    info!("⬇️  Downloading {} with yt-dlp ...", url);
    let status = Command::new("yt-dlp")
        .args(["-f", "best[ext=mp4]", "-o"])
        .arg(&output_file)
        .arg(url)
        .status()
        .context("failed to run yt-dlp (is it installed?)")?;

    if !status.success() {
        bail!("yt-dlp exited with status {}", status);
    }

    info!("✓ Downloaded to {}", output_file.display());
    Ok(output_file)
}
