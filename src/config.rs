use clap::Parser;

/// Model and detection settings, shared by the library and the binaries.
#[derive(Parser, Clone, Debug)]
pub struct Args {
    /// ONNX model: local path or http(s) URL (cached after first download)
    #[arg(long, required = true)]
    pub model: String,

    /// Input image, or a directory of frames for the video binary
    #[arg(long, required = true)]
    pub source: String,

    /// Class labels: JSON array of names, local path or URL.
    /// Falls back to the names embedded in the model metadata.
    #[arg(long)]
    pub labels: Option<String>,

    /// Device id for CUDA / TensorRT
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// Run with the TensorRT execution provider
    #[arg(long)]
    pub trt: bool,

    /// Run with the CUDA execution provider
    #[arg(long)]
    pub cuda: bool,

    /// Let TensorRT build fp16 engines
    #[arg(long)]
    pub fp16: bool,

    /// Input height, used when the model reports a dynamic height
    #[arg(long)]
    pub height: Option<u32>,

    /// Input width, used when the model reports a dynamic width
    #[arg(long)]
    pub width: Option<u32>,

    /// Score threshold
    #[arg(long, default_value_t = 0.2)]
    pub conf: f32,

    /// IoU threshold for overlap suppression
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Most boxes kept by suppression
    #[arg(long, default_value_t = 500)]
    pub max_det: usize,

    /// Print per-stage timings
    #[arg(long)]
    pub profile: bool,

    /// TTF/OTF font for box labels in annotated output
    #[arg(long)]
    pub font: Option<String>,

    /// Print detections as JSON
    #[arg(long)]
    pub json: bool,

    /// Directory for annotated output images
    #[arg(long, default_value = "runs")]
    pub output_dir: String,
}
