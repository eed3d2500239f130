use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use yolov8_detect::{detect_video, Args, YoloModel};

/// Runs detection over a directory of extracted video frames, in file name
/// order. Each frame's completion hook schedules the next one, so a failed
/// frame stops the loop.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut model = YoloModel::load_with_progress(&args, |fraction| {
        eprint!("\rLoading model: {:>3.0}%", fraction * 100.);
        if fraction >= 1. {
            eprintln!();
        }
    })?;
    model.summary();

    let mut frames: Vec<PathBuf> = std::fs::read_dir(&args.source)
        .with_context(|| format!("read frame directory {}", args.source))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.to_ascii_lowercase())
                    .as_deref(),
                Some("jpg" | "jpeg" | "png" | "bmp")
            )
        })
        .collect();
    frames.sort();
    ensure!(!frames.is_empty(), "no frames found in {}", args.source);

    let mut next = 0;
    while next < frames.len() {
        let current = next;
        let frame = image::ImageReader::open(&frames[current])
            .with_context(|| format!("open {}", frames[current].display()))?
            .with_guessed_format()
            .context("guess image format")?
            .decode()
            .with_context(|| format!("decode {}", frames[current].display()))?;

        let t_frame = std::time::Instant::now();
        let detections = detect_video(&frame, &mut model, || next += 1)?;
        println!(
            "[{}/{}] {}: {} object(s) in {:?}",
            current + 1,
            frames.len(),
            frames[current].display(),
            detections.len(),
            t_frame.elapsed(),
        );
    }

    Ok(())
}
