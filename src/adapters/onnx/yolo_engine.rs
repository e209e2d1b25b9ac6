use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use ndarray::{s, Array4, ArrayView2, Axis};
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider};
use ort::session::Session;
use ort::value::Value;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::application::ports::DetectorPort;
use crate::domain::detection::RawDetection;
use crate::domain::device::DeviceKind;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::frame::BgrFrame;
use crate::domain::labels::EMOTION_LABELS;
use crate::domain::model::YoloParams;

/// Gray used for letterbox borders, matching the training pipeline.
const PAD_VALUE: u8 = 114;
/// Per-class box offset so one NMS pass never suppresses across classes.
const CLASS_OFFSET: f32 = 7680.0;

/// YOLOv8-style detector exported to ONNX (`[1, 4 + nc, N]` output).
///
/// `Session::run` needs exclusive access, so concurrent requests take turns on
/// the mutex.
pub struct OnnxYoloEngine {
    session: Mutex<Session>,
    params: YoloParams,
}

impl OnnxYoloEngine {
    pub fn load(path: &Path, device: DeviceKind, params: YoloParams) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // Startup already registered this provider once; failing now is fatal.
        builder = match device {
            DeviceKind::Cuda => builder.with_execution_providers([
                CUDAExecutionProvider::default().build().error_on_failure(),
            ])?,
            DeviceKind::CoreMl => builder.with_execution_providers([
                CoreMLExecutionProvider::default().build().error_on_failure(),
            ])?,
            DeviceKind::Cpu => builder,
        };

        let model_bytes =
            fs::read(path).with_context(|| format!("reading weights {}", path.display()))?;
        let session = builder
            .commit_from_memory(&model_bytes)
            .with_context(|| format!("loading ONNX model {}", path.display()))?;

        info!(
            "Loaded {} ({} bytes) on {} with input {}x{}",
            path.display(),
            model_bytes.len(),
            device,
            params.input_size,
            params.input_size
        );

        Ok(Self {
            session: Mutex::new(session),
            params,
        })
    }

    fn infer(&self, frame: &BgrFrame) -> Result<Vec<RawDetection>> {
        let imgsz = self.params.input_size as usize;
        let (input, geometry) = preprocess(frame, self.params.input_size)?;

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let input_tensor = Value::from_array((input_shape, input.into_raw_vec_and_offset().0))?;

        let (dims, data) = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow!("inference session lock poisoned"))?;
            let outputs = session.run(ort::inputs![input_tensor])?;
            let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape_out.iter().map(|&d| d as usize).collect();
            (dims, data_out.to_vec())
        };

        let candidates = output_view(&dims, &data, EMOTION_LABELS.len())?;
        let detections = postprocess(candidates, &self.params, &geometry);
        Ok(detections)
    }
}

impl DetectorPort for OnnxYoloEngine {
    fn detect(&self, frame: &BgrFrame) -> DomainResult<Vec<RawDetection>> {
        self.infer(frame)
            .map_err(|e| DomainError::Inference(format!("{e:#}")))
    }
}

/// How a source image was fitted into the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub ratio: f32,
    pub pad_left: u32,
    pub pad_top: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn fit(source_width: u32, source_height: u32, input_size: u32) -> Self {
        let side = input_size as f32;
        let ratio = (side / source_height as f32).min(side / source_width as f32);
        let scaled_width = ((source_width as f32 * ratio).round() as u32).clamp(1, input_size);
        let scaled_height = ((source_height as f32 * ratio).round() as u32).clamp(1, input_size);

        let dw = (input_size - scaled_width) as f32 / 2.0;
        let dh = (input_size - scaled_height) as f32 / 2.0;

        Self {
            ratio,
            pad_left: (dw - 0.1).round().max(0.0) as u32,
            pad_top: (dh - 0.1).round().max(0.0) as u32,
            scaled_width,
            scaled_height,
            source_width,
            source_height,
        }
    }

    /// Maps an `x1, y1, x2, y2` box from network space back onto the source
    /// image, clipped to its bounds.
    pub fn unmap(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> (f32, f32, f32, f32) {
        let w = self.source_width as f32;
        let h = self.source_height as f32;
        let px = self.pad_left as f32;
        let py = self.pad_top as f32;
        (
            ((x1 - px) / self.ratio).clamp(0.0, w),
            ((y1 - py) / self.ratio).clamp(0.0, h),
            ((x2 - px) / self.ratio).clamp(0.0, w),
            ((y2 - py) / self.ratio).clamp(0.0, h),
        )
    }
}

/// Builds the `[1, 3, S, S]` RGB tensor scaled to 0..1.
pub fn preprocess(frame: &BgrFrame, input_size: u32) -> Result<(Array4<f32>, Letterbox)> {
    anyhow::ensure!(frame.width() > 0 && frame.height() > 0, "empty frame");
    let geometry = Letterbox::fit(frame.width(), frame.height(), input_size);

    // The network consumes RGB; reverse the frame's BGR order back.
    let rgb = frame.to_rgb_image()?;
    let resized = if (geometry.scaled_width, geometry.scaled_height) == rgb.dimensions() {
        rgb
    } else {
        image::imageops::resize(
            &rgb,
            geometry.scaled_width,
            geometry.scaled_height,
            FilterType::Triangle,
        )
    };

    let imgsz = input_size as usize;
    let mut input = Array4::<f32>::from_elem((1, 3, imgsz, imgsz), PAD_VALUE as f32 / 255.0);
    let (left, top) = (geometry.pad_left as usize, geometry.pad_top as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (xi, yi) = (x as usize + left, y as usize + top);
        input[[0, 0, yi, xi]] = pixel[0] as f32 / 255.0;
        input[[0, 1, yi, xi]] = pixel[1] as f32 / 255.0;
        input[[0, 2, yi, xi]] = pixel[2] as f32 / 255.0;
    }

    Ok((input, geometry))
}

/// Views the raw output as `[4 + nc, N]`, accepting the transposed
/// `[N, 4 + nc]` layout some exporters emit. The class count must equal
/// `num_classes` so labels cannot silently drift from the model.
pub fn output_view<'a>(
    dims: &[usize],
    data: &'a [f32],
    num_classes: usize,
) -> Result<ArrayView2<'a, f32>> {
    let rows = 4 + num_classes;
    let (a, b) = match dims {
        [1, a, b] | [a, b] => (*a, *b),
        other => anyhow::bail!("unexpected detector output shape {:?}", other),
    };

    let view = ArrayView2::from_shape((a, b), data)
        .map_err(|e| anyhow!("detector output does not match shape {:?}: {e}", dims))?;

    if a == rows {
        Ok(view)
    } else if b == rows {
        Ok(view.reversed_axes())
    } else {
        anyhow::bail!(
            "model reports {} classes but {} labels are configured",
            a.min(b).saturating_sub(4),
            num_classes
        )
    }
}

/// Confidence floor, class-aware NMS, `max_detections`, then mapping to
/// source pixels. Degenerate boxes left after clipping are dropped. Output is
/// sorted by descending score.
pub fn postprocess(
    view: ArrayView2<'_, f32>,
    params: &YoloParams,
    geometry: &Letterbox,
) -> Vec<RawDetection> {
    let mut candidates = Vec::new();

    for column in view.axis_iter(Axis(1)) {
        let scores = column.slice(s![4..]);
        let Some((class_id, &score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };

        if !score.is_finite() || score <= params.conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        candidates.push(RawDetection {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            class_id,
            score,
        });
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    let mut kept = non_max_suppression(candidates, params.iou_threshold);
    kept.truncate(params.max_detections);

    kept.into_iter()
        .map(|d| {
            let (x1, y1, x2, y2) = geometry.unmap(d.x1, d.y1, d.x2, d.y2);
            RawDetection { x1, y1, x2, y2, ..d }
        })
        .filter(RawDetection::is_well_formed)
        .collect()
}

/// Greedy NMS over score-sorted candidates; boxes of different classes never
/// suppress each other.
fn non_max_suppression(candidates: Vec<RawDetection>, threshold: f32) -> Vec<RawDetection> {
    let shifted = |d: &RawDetection| {
        let off = d.class_id as f32 * CLASS_OFFSET;
        RawDetection { x1: d.x1 + off, y1: d.y1 + off, x2: d.x2 + off, y2: d.y2 + off, ..*d }
    };

    let mut result: Vec<RawDetection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let candidate_box = shifted(&candidate);
        let suppressed = result.iter().any(|kept| shifted(kept).iou(&candidate_box) > threshold);
        if !suppressed {
            result.push(candidate);
        }
    }
    result
}
