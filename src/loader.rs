// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use ndarray::{Array, IxDyn};
use tracing::{debug, info, warn};

use crate::config::Args;
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP, TensorLayout};

/// A loaded detection network: the session plus everything detection needs
/// (input shape, layout, labels, suppression settings).
pub struct YoloModel {
    engine: OrtBackend,
    names: Vec<String>,
    nc: usize,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    max_det: usize,
    profile: bool,
}

impl YoloModel {
    pub fn load(config: &Args) -> Result<Self> {
        Self::load_with_progress(config, |_| {})
    }

    /// Loads the network and labels, then warms the session up with one
    /// zero-filled pass.
    ///
    /// `on_progress` receives fractions in `[0, 1]`: intermediate values
    /// while model weights download, and a final `1.0` only once the warm-up
    /// succeeded. A load that fails never reports completion.
    pub fn load_with_progress(config: &Args, mut on_progress: impl FnMut(f32)) -> Result<Self> {
        // execution provider
        let ep = if config.trt {
            OrtEP::Trt(config.device_id)
        } else if config.cuda {
            OrtEP::CUDA(config.device_id)
        } else {
            OrtEP::CPU
        };

        // model weights, fetched into the cache when given as a URL
        let model_path = resolve_model(&config.model, &mut on_progress)?;

        // build ort engine
        let ort_args = OrtConfig {
            f: model_path,
            ep,
            trt_fp16: config.fp16,
            image_size: (config.height, config.width),
        };
        let engine = OrtBackend::build(ort_args)?;
        let (height, width) = (engine.height(), engine.width());

        // class names: explicit label file first, exporter metadata second
        let names = match &config.labels {
            Some(src) => fetch_labels(src)?,
            None => engine
                .names()
                .context("no labels configured and none embedded in the model")?,
        };
        let nc = engine.nc().map(|n| n as usize).unwrap_or(names.len());
        if nc != names.len() {
            warn!(
                nc,
                labels = names.len(),
                "label count does not match the model output"
            );
        }
        if let Some(task) = engine.task() {
            if task != "detect" {
                warn!(task = %task, "model task is not detect");
            }
        }

        let mut model = Self {
            engine,
            names,
            nc,
            height,
            width,
            conf: config.conf,
            iou: config.iou,
            max_det: config.max_det,
            profile: config.profile,
        };
        model.warmup()?;
        on_progress(1.0);
        info!(model = %config.model, height, width, "model ready");
        Ok(model)
    }

    /// One throwaway pass with a zero-filled input so the first real frame
    /// does not pay graph initialization. The output is discarded.
    fn warmup(&mut self) -> Result<()> {
        let (h, w) = (self.height as usize, self.width as usize);
        let shape = match self.engine.layout() {
            TensorLayout::Nchw => [1, 3, h, w],
            TensorLayout::Nhwc => [1, h, w, 3],
        };
        let zeros: Array<f32, IxDyn> = Array::zeros(IxDyn(&shape));
        self.engine.run(zeros)?;
        debug!("warm-up pass done");
        Ok(())
    }

    pub fn summary(&self) {
        println!(
            "\nSummary:\n\
            > Task: {}{}\n\
            > EP: {:?} {}\n\
            > Dtype: {}\n\
            > Batch: 1 ({}), Height: {} ({}), Width: {} ({}), Layout: {:?}\n\
            > nc: {}, conf: {}, iou: {}, max_det: {}\n\
            ",
            self.engine.task().unwrap_or_else(|| String::from("detect")),
            match self.engine.author().zip(self.engine.version()) {
                Some((author, ver)) => format!(" ({} {})", author, ver),
                None => String::from(""),
            },
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                "(May still fall back to CPU)"
            },
            self.engine.dtype(),
            if self.engine.is_batch_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.height,
            if self.engine.is_height_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.width,
            if self.engine.is_width_dynamic() {
                "Dynamic"
            } else {
                "Const"
            },
            self.engine.layout(),
            self.nc,
            self.conf,
            self.iou,
            self.max_det,
        );
    }

    pub fn engine_mut(&mut self) -> &mut OrtBackend {
        &mut self.engine
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn nc(&self) -> usize {
        self.nc
    }

    pub fn layout(&self) -> TensorLayout {
        self.engine.layout()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn conf(&self) -> f32 {
        self.conf
    }

    pub fn set_conf(&mut self, val: f32) {
        self.conf = val;
    }

    pub fn iou(&self) -> f32 {
        self.iou
    }

    pub fn set_iou(&mut self, val: f32) {
        self.iou = val;
    }

    pub fn max_det(&self) -> usize {
        self.max_det
    }

    pub fn profile(&self) -> bool {
        self.profile
    }
}

fn is_url(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Local paths pass through; URLs download into the user cache once and are
/// reused afterwards.
fn resolve_model(src: &str, on_progress: &mut impl FnMut(f32)) -> Result<String> {
    if !is_url(src) {
        ensure!(Path::new(src).exists(), "model file not found: {src}");
        return Ok(src.to_string());
    }

    let cache = dirs::cache_dir()
        .context("no cache directory on this platform")?
        .join("yolov8-detect");
    fs::create_dir_all(&cache).with_context(|| format!("create {}", cache.display()))?;
    let file_name = src
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("model.onnx");
    let dest = cache.join(file_name);
    if dest.exists() {
        debug!(path = %dest.display(), "model already cached");
        return Ok(dest.to_string_lossy().into_owned());
    }

    download(src, &dest, on_progress)?;
    Ok(dest.to_string_lossy().into_owned())
}

/// Streams the body to memory, reporting `read / content_length` fractions
/// while the server advertises a length, then writes the file in one go so a
/// broken transfer leaves no partial file behind.
fn download(url: &str, dest: &Path, on_progress: &mut impl FnMut(f32)) -> Result<()> {
    info!(url, "downloading model");
    let resp = ureq::get(url).call().with_context(|| format!("GET {url}"))?;
    let total: Option<u64> = resp
        .header("Content-Length")
        .and_then(|v| v.parse().ok())
        .filter(|&n| n > 0);

    let mut reader = resp.into_reader();
    let mut body = Vec::new();
    let mut buf = [0u8; 64 * 1024];
    let mut read_total: u64 = 0;
    loop {
        let n = reader.read(&mut buf).context("read model body")?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
        read_total += n as u64;
        if let Some(total) = total {
            // 1.0 is reserved for after the warm-up pass
            on_progress((read_total as f32 / total as f32).min(0.99));
        }
    }
    fs::write(dest, &body).with_context(|| format!("write {}", dest.display()))?;
    debug!(bytes = read_total, "model downloaded");
    Ok(())
}

/// Labels are a JSON array of class names; array position is the class id.
pub fn fetch_labels(src: &str) -> Result<Vec<String>> {
    let text = if is_url(src) {
        ureq::get(src)
            .call()
            .with_context(|| format!("GET {src}"))?
            .into_string()
            .context("read label body")?
    } else {
        fs::read_to_string(src).with_context(|| format!("read {src}"))?
    };
    parse_labels(&text)
}

fn parse_labels(text: &str) -> Result<Vec<String>> {
    let names: Vec<String> =
        serde_json::from_str(text).context("labels must be a JSON array of strings")?;
    ensure!(!names.is_empty(), "label list is empty");
    Ok(names)
}
