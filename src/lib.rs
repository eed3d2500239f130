// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

pub mod config; // CLI / model configuration
pub mod detect; // detector orchestration + video driver
pub mod draw; // box annotation for the binaries
pub mod loader; // model + label acquisition, warm-up
pub mod ort_backend;
pub mod postprocess;
pub mod preprocess;

pub use crate::config::Args;
pub use crate::detect::{detect, detect_video};
pub use crate::loader::YoloModel;
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP, TensorLayout};

use serde::{Deserialize, Serialize};

/// Greedy overlap suppression over candidate boxes.
///
/// `boxes` come in `[y1, x1, y2, x2]` order with a parallel `scores` slice of
/// the same length. Entries below `score_threshold` are skipped; the rest are
/// visited in descending score order, keeping a box only when its IoU with
/// every already-kept box stays at or under `iou_threshold`, class-agnostic.
/// Returns the kept indices, best score first, at most `max_output` of them.
pub fn non_max_suppression(
    boxes: &[[f32; 4]],
    scores: &[f32],
    max_output: usize,
    iou_threshold: f32,
    score_threshold: f32,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len())
        .filter(|&i| scores[i] >= score_threshold)
        .collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap());

    let mut keep: Vec<usize> = Vec::new();
    let mut kept_boxes: Vec<Bbox> = Vec::new();
    for index in order {
        if keep.len() >= max_output {
            break;
        }
        let candidate = Bbox::from_yxyx(boxes[index]);
        let mut drop = false;
        for prev in kept_boxes.iter() {
            if prev.iou(&candidate) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            keep.push(index);
            kept_boxes.push(candidate);
        }
    }
    keep
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bbox {
    // a bounding box around an object
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
        }
    }

    /// Corner order matches the suppression input: `[y1, x1, y2, x2]`.
    pub fn from_yxyx(corners: [f32; 4]) -> Self {
        let [y1, x1, y2, x2] = corners;
        Self {
            xmin: x1,
            ymin: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        self.intersection_area(another) / self.union(another)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    // one detected object, in model input space
    class: String,
    bbox: Bbox,
    score: f32,
}

impl Detection {
    pub fn new(class: String, bbox: Bbox, score: f32) -> Self {
        Self { class, bbox, score }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn bbox(&self) -> &Bbox {
        &self.bbox
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(y1: f32, x1: f32, y2: f32, x2: f32) -> [f32; 4] {
        [y1, x1, y2, x2]
    }

    #[test]
    fn test_iou_identical() {
        let a = Bbox::new(0., 0., 10., 10.);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = Bbox::new(0., 0., 10., 10.);
        let b = Bbox::new(20., 20., 5., 5.);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = Bbox::new(0., 0., 10., 10.);
        let b = Bbox::new(5., 0., 10., 10.);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_yxyx_roundtrip() {
        let b = Bbox::from_yxyx([2., 1., 12., 21.]);
        assert!((b.xmin() - 1.).abs() < 1e-6);
        assert!((b.ymin() - 2.).abs() < 1e-6);
        assert!((b.width() - 20.).abs() < 1e-6);
        assert!((b.height() - 10.).abs() < 1e-6);
    }

    #[test]
    fn test_nms_orders_by_score() {
        let boxes = vec![
            bx(0., 0., 10., 10.),
            bx(100., 100., 110., 110.),
            bx(200., 200., 210., 210.),
        ];
        let scores = vec![0.5, 0.9, 0.7];
        let keep = non_max_suppression(&boxes, &scores, 500, 0.45, 0.2);
        assert_eq!(keep, vec![1, 2, 0]);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let boxes = vec![
            bx(0., 0., 10., 10.),
            bx(1., 1., 11., 11.),
            bx(50., 50., 60., 60.),
        ];
        let scores = vec![0.6, 0.9, 0.8];
        let keep = non_max_suppression(&boxes, &scores, 500, 0.45, 0.2);
        // first two overlap heavily, only the higher-scoring one survives
        assert_eq!(keep, vec![1, 2]);
    }

    #[test]
    fn test_nms_score_threshold() {
        let boxes = vec![bx(0., 0., 10., 10.), bx(100., 100., 110., 110.)];
        let scores = vec![0.1, 0.9];
        let keep = non_max_suppression(&boxes, &scores, 500, 0.45, 0.2);
        assert_eq!(keep, vec![1]);
    }

    #[test]
    fn test_nms_max_output() {
        let boxes: Vec<[f32; 4]> = (0..10)
            .map(|i| {
                let o = i as f32 * 100.;
                bx(o, o, o + 10., o + 10.)
            })
            .collect();
        let scores: Vec<f32> = (0..10).map(|i| 0.3 + i as f32 * 0.05).collect();
        let keep = non_max_suppression(&boxes, &scores, 3, 0.45, 0.2);
        assert_eq!(keep, vec![9, 8, 7]);
    }

    #[test]
    fn test_nms_empty_input() {
        let keep = non_max_suppression(&[], &[], 500, 0.45, 0.2);
        assert!(keep.is_empty());
    }

    #[test]
    fn test_detection_serializes() {
        let det = Detection::new("person".to_string(), Bbox::new(1., 2., 3., 4.), 0.9);
        let js = serde_json::to_string(&det).unwrap();
        assert!(js.contains("\"person\""));
    }
}
