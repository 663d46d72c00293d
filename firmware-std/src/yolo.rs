//! YOLOv8 detector on tract.
//!
//! Loads an Ultralytics ONNX export, reads class labels from its `names`
//! metadata, and decodes the `[1, 4 + classes, anchors]` head. Only the
//! requested class is ever scored, so other classes never surface.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use loracam::capture::Frame;
use loracam::detector::{BoundingBox, ClassId, Detection, Detector};
use loracam::{Error, Result};

/// Square network input size
const INPUT_SIZE: u32 = 640;

/// Letterbox padding grey used by Ultralytics
const PAD: Rgb<u8> = Rgb([114, 114, 114]);

/// Overlap above which a lower-scored box is suppressed
const IOU_THRESHOLD: f32 = 0.45;

/// Cap on detections returned per frame
const MAX_DETECTIONS: usize = 100;

type Plan = TypedRunnableModel<TypedModel>;

pub struct YoloDetector {
    plan: Plan,
    names: Vec<String>,
}

impl YoloDetector {
    pub fn load(path: &Path) -> Result<Self> {
        let onnx = tract_onnx::onnx();
        let proto = onnx
            .proto_model_for_path(path)
            .map_err(|e| Error::hardware_init("model", e.to_string()))?;

        let names = proto
            .metadata_props
            .iter()
            .find(|p| p.key == "names")
            .map(|p| parse_names(&p.value))
            .unwrap_or_default();
        if names.is_empty() {
            return Err(Error::hardware_init(
                "model",
                format!("{} carries no class names metadata", path.display()),
            ));
        }

        let size = INPUT_SIZE as usize;
        let plan = onnx
            .model_for_proto_model(&proto)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| Error::hardware_init("model", e.to_string()))?;

        log::info!("Model {} loaded, {} classes", path.display(), names.len());
        Ok(Self { plan, names })
    }
}

impl Detector for YoloDetector {
    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn classify(
        &mut self,
        frame: &Frame,
        class: ClassId,
        threshold: f32,
    ) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::new(frame.width(), frame.height());
        let input = letterbox.apply(frame);

        let size = INPUT_SIZE as usize;
        let tensor: Tensor =
            tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
                input.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
            })
            .into();

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| Error::detector(e.to_string()))?;
        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| Error::detector(e.to_string()))?;
        let shape = view.shape().to_vec();
        let head = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|_| Error::detector(format!("unexpected output shape {shape:?}")))?;
        if head.dim().1 < 4 + class + 1 {
            return Err(Error::detector(format!("class {class} outside output shape {shape:?}")));
        }

        let mut candidates = Vec::new();
        for i in 0..head.dim().2 {
            let score = head[[0, 4 + class, i]];
            if score < threshold {
                continue;
            }
            let (cx, cy, w, h) = (
                head[[0, 0, i]],
                head[[0, 1, i]],
                head[[0, 2, i]],
                head[[0, 3, i]],
            );
            candidates.push(Detection {
                class,
                confidence: score,
                bbox: letterbox.unmap(cx - w / 2.0, cy - h / 2.0, w, h),
            });
        }

        Ok(non_max_suppression(candidates, IOU_THRESHOLD, MAX_DETECTIONS))
    }
}

/// Scale-and-pad transform between frame and network input
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn new(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let (w, h) = (
            (width as f32 * scale).round() as u32,
            (height as f32 * scale).round() as u32,
        );
        Self {
            scale,
            pad_x: ((INPUT_SIZE - w) / 2) as f32,
            pad_y: ((INPUT_SIZE - h) / 2) as f32,
            width: w,
            height: h,
        }
    }

    fn apply(&self, frame: &Frame) -> RgbImage {
        let resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, PAD);
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    fn unmap(&self, x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x: (x - self.pad_x) / self.scale,
            y: (y - self.pad_y) / self.scale,
            width: w / self.scale,
            height: h / self.scale,
        }
    }
}

/// Greedy NMS; output is sorted by descending confidence.
fn non_max_suppression(mut candidates: Vec<Detection>, iou: f32, limit: usize) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        if kept.len() == limit {
            break;
        }
        if kept.iter().all(|k| k.bbox.iou(&cand.bbox) <= iou) {
            kept.push(cand);
        }
    }
    kept
}

/// Parse Ultralytics' `{0: 'person', 1: 'bicycle'}` metadata into a label list.
fn parse_names(raw: &str) -> Vec<String> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let mut entries: Vec<(usize, String)> = body
        .split(',')
        .filter_map(|entry| {
            let (idx, name) = entry.split_once(':')?;
            let idx = idx.trim().parse().ok()?;
            let name = name.trim().trim_matches(['\'', '"']);
            Some((idx, name.to_string()))
        })
        .collect();
    entries.sort_by_key(|(idx, _)| *idx);
    entries.into_iter().map(|(_, name)| name).collect()
}
