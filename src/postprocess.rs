// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::{ensure, Context, Result};
use ndarray::{s, ArrayViewD, Axis};

use crate::{non_max_suppression, Bbox, Detection};

const CXYWH_OFFSET: usize = 4;

/// Decodes the transposed network output `[batch, num_preds, 4 + nc]` into
/// the final detection list.
///
/// Each row is `cx, cy, w, h` followed by `nc` class scores. The corner is
/// recovered with `x1 = cx - w/2`, `y1 = cy - h/2`; candidates go through
/// suppression as `[y1, x1, y2, x2]` with the per-row best score and class
/// index. Survivors come back in suppression order (best score first) as
/// `[x, y, width, height]` boxes with the class index mapped through
/// `names` (an index past the label list keeps its numeric form).
pub fn postprocess(
    preds: &ArrayViewD<f32>,
    names: &[String],
    conf: f32,
    iou: f32,
    max_det: usize,
) -> Result<Vec<Detection>> {
    ensure!(
        preds.ndim() == 3,
        "expected [batch, preds, channels] output, got {:?}",
        preds.shape()
    );
    ensure!(preds.shape()[0] >= 1, "empty output batch");
    ensure!(
        preds.shape()[2] > CXYWH_OFFSET,
        "model output has no class channels: {:?}",
        preds.shape()
    );
    let nc = preds.shape()[2] - CXYWH_OFFSET;

    let mut boxes: Vec<[f32; 4]> = Vec::new();
    let mut scores: Vec<f32> = Vec::new();
    let mut classes: Vec<usize> = Vec::new();

    let anchor = preds.index_axis(Axis(0), 0);
    for pred in anchor.axis_iter(Axis(0)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);
        let (id, &score) = clss
            .into_iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
            .context("empty class scores")?;

        let w = bbox[2];
        let h = bbox[3];
        let x1 = bbox[0] - w / 2.;
        let y1 = bbox[1] - h / 2.;
        boxes.push([y1, x1, y1 + h, x1 + w]);
        scores.push(score);
        classes.push(id);
    }

    let keep = non_max_suppression(&boxes, &scores, max_det, iou, conf);

    let mut ys = Vec::with_capacity(keep.len());
    for index in keep {
        let bbox = Bbox::from_yxyx(boxes[index]);
        let class = names
            .get(classes[index])
            .cloned()
            .unwrap_or_else(|| classes[index].to_string());
        ys.push(Detection::new(class, bbox, scores[index]));
    }
    Ok(ys)
}
