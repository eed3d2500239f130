// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use regex::Regex;
use tracing::debug;

/// Input side used when the model reports a dynamic spatial dimension and no
/// override is configured.
const DEFAULT_SIDE: u32 = 640;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// Spatial layout of the model input, fixed by the network file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

pub struct OrtConfig {
    // where the model is
    pub f: String,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    // (height, width) override for dynamic dims
    pub image_size: (Option<u32>, Option<u32>),
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    layout: TensorLayout,
    height: u32,
    width: u32,
    batch_dynamic: bool,
    height_dynamic: bool,
    width_dynamic: bool,
    dtype: String,
    nc: Option<u32>,
    input_name: String,
    output_name: String,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        // execution providers; a missing runtime falls back to CPU at session init
        let mut providers: Vec<ExecutionProviderDispatch> = Vec::new();
        match &args.ep {
            #[cfg(feature = "cuda")]
            OrtEP::CUDA(device_id) => {
                providers.push(
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(*device_id)
                        .build(),
                );
            }
            #[cfg(feature = "tensorrt")]
            OrtEP::Trt(device_id) => {
                let mut trt = ort::execution_providers::TensorRTExecutionProvider::default()
                    .with_device_id(*device_id);
                if args.trt_fp16 {
                    trt = trt.with_fp16(true);
                }
                providers.push(trt.build());
            }
            #[cfg(not(feature = "cuda"))]
            OrtEP::CUDA(..) => {
                bail!("CUDA requested but this build lacks the `cuda` feature")
            }
            #[cfg(not(feature = "tensorrt"))]
            OrtEP::Trt(..) => {
                bail!("TensorRT requested but this build lacks the `tensorrt` feature")
            }
            OrtEP::CPU => {
                providers.push(CPUExecutionProvider::default().build());
            }
        }
        builder = builder.with_execution_providers(providers)?;

        let session = builder
            .commit_from_file(&args.f)
            .with_context(|| format!("load model {}", args.f))?;

        // input contract: name, element type, 4-d image shape
        let input = session.inputs.first().context("model has no inputs")?;
        let input_name = input.name.clone();
        let (idims, dtype): (Vec<i64>, String) = match &input.input_type {
            ValueType::Tensor { ty, shape, .. } => {
                (shape.iter().copied().collect(), format!("{ty:?}"))
            }
            other => bail!("unsupported model input type: {other:?}"),
        };
        ensure!(idims.len() == 4, "expected a 4-d image input, got {idims:?}");

        let layout = probe_layout(&idims);
        let (bs_raw, h_raw, w_raw) = match layout {
            TensorLayout::Nchw => (idims[0], idims[2], idims[3]),
            TensorLayout::Nhwc => (idims[0], idims[1], idims[2]),
        };
        let batch_dynamic = bs_raw <= 0;
        let height_dynamic = h_raw <= 0;
        let width_dynamic = w_raw <= 0;
        let (oh, ow) = args.image_size;
        let height = if height_dynamic {
            oh.unwrap_or(DEFAULT_SIDE)
        } else {
            h_raw as u32
        };
        let width = if width_dynamic {
            ow.unwrap_or(DEFAULT_SIDE)
        } else {
            w_raw as u32
        };

        // first output carries the detections; class count only when static
        let output = session.outputs.first().context("model has no outputs")?;
        let output_name = output.name.clone();
        let nc = match &output.output_type {
            ValueType::Tensor { shape, .. } if shape.len() == 3 && shape[1] > 4 => {
                Some(shape[1] as u32 - 4)
            }
            _ => None,
        };

        debug!(
            input = %input_name,
            output = %output_name,
            ?layout,
            height,
            width,
            "session ready"
        );

        Ok(Self {
            session,
            ep: args.ep,
            layout,
            height,
            width,
            batch_dynamic,
            height_dynamic,
            width_dynamic,
            dtype,
            nc,
            input_name,
            output_name,
        })
    }

    /// One forward pass: a `[batch, ...]` f32 tensor in, the first output
    /// tensor out as an owned array.
    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        let xs = xs.as_standard_layout();
        let tensor = TensorRef::from_array_view(&xs)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])?;
        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let ys = Array::from_shape_vec(IxDyn(&dims), data.to_vec())?;
        Ok(ys)
    }

    fn fetch_from_metadata(&self, key: &str) -> Option<String> {
        let metadata = self.session.metadata().ok()?;
        metadata.custom(key).ok().flatten()
    }

    /// Class names embedded by the exporter, when present.
    pub fn names(&self) -> Option<Vec<String>> {
        parse_names_meta(&self.fetch_from_metadata("names")?)
    }

    pub fn task(&self) -> Option<String> {
        self.fetch_from_metadata("task")
    }

    pub fn author(&self) -> Option<String> {
        self.fetch_from_metadata("author")
    }

    pub fn version(&self) -> Option<String> {
        self.fetch_from_metadata("version")
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn nc(&self) -> Option<u32> {
        self.nc
    }

    pub fn dtype(&self) -> &str {
        &self.dtype
    }

    pub fn is_batch_dynamic(&self) -> bool {
        self.batch_dynamic
    }

    pub fn is_height_dynamic(&self) -> bool {
        self.height_dynamic
    }

    pub fn is_width_dynamic(&self) -> bool {
        self.width_dynamic
    }
}

fn probe_layout(dims: &[i64]) -> TensorLayout {
    // the channel axis holds the literal 3; NCHW is the YOLO default
    if dims.len() == 4 && dims[3] == 3 && dims[1] != 3 {
        TensorLayout::Nhwc
    } else {
        TensorLayout::Nchw
    }
}

/// The `names` metadata entry is a python-style dict, e.g.
/// `{0: 'person', 1: 'bicycle', 2: 'car'}`.
fn parse_names_meta(meta: &str) -> Option<Vec<String>> {
    let re = Regex::new(r#"['"]([^'"]+)['"]"#).ok()?;
    let names: Vec<String> = re.captures_iter(meta).map(|c| c[1].to_string()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_layout_nchw() {
        assert_eq!(probe_layout(&[1, 3, 640, 640]), TensorLayout::Nchw);
        assert_eq!(probe_layout(&[-1, 3, -1, -1]), TensorLayout::Nchw);
    }

    #[test]
    fn test_probe_layout_nhwc() {
        assert_eq!(probe_layout(&[1, 640, 640, 3]), TensorLayout::Nhwc);
        assert_eq!(probe_layout(&[-1, -1, -1, 3]), TensorLayout::Nhwc);
    }

    #[test]
    fn test_parse_names_single_quoted() {
        let meta = "{0: 'person', 1: 'traffic light', 2: 'fire hydrant'}";
        let names = parse_names_meta(meta).unwrap();
        assert_eq!(names, vec!["person", "traffic light", "fire hydrant"]);
    }

    #[test]
    fn test_parse_names_double_quoted() {
        let meta = r#"{0: "cat", 1: "dog"}"#;
        let names = parse_names_meta(meta).unwrap();
        assert_eq!(names, vec!["cat", "dog"]);
    }

    #[test]
    fn test_parse_names_empty() {
        assert!(parse_names_meta("{}").is_none());
        assert!(parse_names_meta("").is_none());
    }
}
