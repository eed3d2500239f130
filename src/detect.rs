// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::Result;
use image::DynamicImage;
use ndarray::IxDyn;

use crate::loader::YoloModel;
use crate::postprocess::postprocess;
use crate::preprocess::preprocess;
use crate::Detection;

/// Runs one image through the full pipeline: pad and resize, forward pass,
/// decode plus suppression, label mapping.
///
/// Returned boxes are in model input pixels. `on_complete` fires after the
/// intermediate tensors are dropped and before the results are returned;
/// callers use it to schedule the next frame. The `&mut` borrow on `model`
/// keeps a second call from overlapping this one.
pub fn detect(
    source: &DynamicImage,
    model: &mut YoloModel,
    on_complete: impl FnOnce(),
) -> Result<Vec<Detection>> {
    let profile = model.profile();

    // pre-process
    let t_pre = std::time::Instant::now();
    let (input, _x_ratio, _y_ratio) =
        preprocess(source, model.width(), model.height(), model.layout())?;
    if profile {
        println!("[Model Preprocess]: {:?}", t_pre.elapsed());
    }

    // run
    let t_run = std::time::Instant::now();
    let preds = model.engine_mut().run(input)?;
    if profile {
        println!("[Model Inference]: {:?}", t_run.elapsed());
    }

    // post-process: candidates are channel major, flip to one row per box
    let t_post = std::time::Instant::now();
    let trans = preds.permuted_axes(IxDyn(&[0, 2, 1]));
    let detections = postprocess(
        &trans.view(),
        model.names(),
        model.conf(),
        model.iou(),
        model.max_det(),
    )?;
    if profile {
        println!("[Model Postprocess]: {:?}", t_post.elapsed());
    }

    drop(trans);
    on_complete();
    Ok(detections)
}

/// Video is single frame detection in a loop: the caller grabs frames and
/// schedules the next one from `on_frame_done`.
pub fn detect_video(
    frame: &DynamicImage,
    model: &mut YoloModel,
    on_frame_done: impl FnOnce(),
) -> Result<Vec<Detection>> {
    detect(frame, model, on_frame_done)
}
