use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::imageops::{self, FilterType};

use yolov8_detect::draw::{annotate, load_font};
use yolov8_detect::preprocess::pad_to_square;
use yolov8_detect::{detect, gen_time_string, Args, YoloModel};

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

    let img = image::ImageReader::open(&args.source)
        .with_context(|| format!("open {}", args.source))?
        .with_guessed_format()
        .context("guess image format")?
        .decode()
        .with_context(|| format!("decode {}", args.source))?;

    let detections = detect(&img, &mut model, || {})?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&detections)?);
    } else {
        println!("Detected {} object(s):", detections.len());
        for det in &detections {
            let bbox = det.bbox();
            println!(
                "> {:<16} {:.3} at [{:.1}, {:.1}, {:.1}, {:.1}]",
                det.class(),
                det.score(),
                bbox.xmin(),
                bbox.ymin(),
                bbox.width(),
                bbox.height(),
            );
        }
    }

    // boxes are in model input pixels, so annotate the squared + resized view
    let (squared, _, _) = pad_to_square(&img.to_rgb8());
    let mut canvas = imageops::resize(&squared, model.width(), model.height(), FilterType::Triangle);
    let font = match &args.font {
        Some(path) => Some(load_font(path)?),
        None => None,
    };
    annotate(&mut canvas, &detections, font.as_ref());

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("create {}", args.output_dir))?;
    let saveout = PathBuf::from(&args.output_dir).join(format!("result_{}.jpg", gen_time_string("-")));
    canvas
        .save(&saveout)
        .with_context(|| format!("save {}", saveout.display()))?;
    println!("Annotated image saved to {}", saveout.display());

    Ok(())
}
