//! U2-Net salient object segmentation through ONNX Runtime.
//!
//! Works with the `u2net.onnx` and `u2netp.onnx` exports: a single
//! `[1, 3, 320, 320]` float input normalized with ImageNet statistics, and
//! a first output holding the fused saliency map at the same resolution.

use std::path::Path;
use std::sync::Mutex;

use cutout_core::segmenter::Segmenter;
use cutout_types::error::CutoutError;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage, RgbaImage};
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

const INPUT_SIZE: u32 = 320;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct U2NetSegmenter {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
    name: String,
}

impl U2NetSegmenter {
    /// Build an inference session from an `.onnx` file.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, CutoutError> {
        if !model_path.is_file() {
            return Err(CutoutError::ResourceInit(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        let mut builder = Session::builder().map_err(init_error)?;
        if intra_threads > 0 {
            builder = builder.with_intra_threads(intra_threads).map_err(init_error)?;
        }
        let session = builder.commit_from_file(model_path).map_err(init_error)?;

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "u2net".to_string());
        debug!(model = %model_path.display(), intra_threads, "onnx session created");

        Ok(Self {
            session: Mutex::new(session),
            name,
        })
    }

    fn saliency(&self, input: Vec<f32>) -> Result<Vec<f32>, CutoutError> {
        let side = INPUT_SIZE as usize;
        let tensor = Tensor::from_array(([1usize, 3, side, side], input)).map_err(run_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| CutoutError::Segmentation("onnx session poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![tensor]).map_err(run_error)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(run_error)?;

        if data.len() != side * side {
            return Err(CutoutError::Segmentation(format!(
                "unexpected saliency map of {} values",
                data.len()
            )));
        }
        Ok(data.to_vec())
    }
}

impl Segmenter for U2NetSegmenter {
    fn name(&self) -> &str {
        &self.name
    }

    fn segment(&self, image: &RgbImage) -> Result<RgbaImage, CutoutError> {
        let (w, h) = image.dimensions();
        let saliency = self.saliency(preprocess(image))?;
        let mask = postprocess(&saliency, w, h);

        Ok(RgbaImage::from_fn(w, h, |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            image::Rgba([r, g, b, mask.get_pixel(x, y)[0]])
        }))
    }
}

/// Resize to the model input and lay out as normalized CHW floats.
fn preprocess(image: &RgbImage) -> Vec<f32> {
    let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut tensor = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let idx = (y * INPUT_SIZE + x) as usize;
        for c in 0..3 {
            tensor[c * plane + idx] = (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}

/// Min-max normalize the saliency map and scale it back to `w` x `h`.
fn postprocess(saliency: &[f32], w: u32, h: u32) -> GrayImage {
    let (lo, hi) = saliency
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = (hi - lo).max(f32::EPSILON);

    let small = GrayImage::from_fn(INPUT_SIZE, INPUT_SIZE, |x, y| {
        let v = saliency[(y * INPUT_SIZE + x) as usize];
        Luma([(((v - lo) / range) * 255.0).round().clamp(0.0, 255.0) as u8])
    });
    imageops::resize(&small, w, h, FilterType::Triangle)
}

fn init_error(e: ort::Error) -> CutoutError {
    CutoutError::ResourceInit(e.to_string())
}

fn run_error(e: ort::Error) -> CutoutError {
    CutoutError::Segmentation(e.to_string())
}
