/// Single-class object detection.
///
/// The detector model knows many classes; the bridge only ever asks about
/// one. The target label is resolved to a [`ClassId`] once at startup and
/// that handle is used for the rest of the process lifetime. Results are
/// filtered again on this side of the trait so a detection of any other
/// class, or below the threshold, can never reach the recorder.
use image::{Rgb, RgbImage};

use crate::capture::Frame;
use crate::error::{Error, Result};

/// Index into the detector's class list
pub type ClassId = usize;

/// Outline colour for annotated frames
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 64, 0]);

/// Outline thickness in pixels
pub const BOX_THICKNESS: u32 = 3;

/// Axis-aligned box in frame pixel coordinates (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class: ClassId,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

pub trait Detector {
    /// Class labels the model was trained on, indexed by [`ClassId`]
    fn class_names(&self) -> &[String];

    /// Run inference on a frame, reporting only `class` at or above `threshold`.
    /// An empty result is a normal outcome.
    fn classify(&mut self, frame: &Frame, class: ClassId, threshold: f32)
        -> Result<Vec<Detection>>;

    /// Draw detections onto a copy of the frame.
    fn render(&self, frame: &Frame, detections: &[Detection]) -> Result<RgbImage> {
        Ok(annotate(frame, detections, BOX_COLOR))
    }
}

impl<D: Detector + ?Sized> Detector for &mut D {
    fn class_names(&self) -> &[String] {
        (**self).class_names()
    }

    fn classify(
        &mut self,
        frame: &Frame,
        class: ClassId,
        threshold: f32,
    ) -> Result<Vec<Detection>> {
        (**self).classify(frame, class, threshold)
    }

    fn render(&self, frame: &Frame, detections: &[Detection]) -> Result<RgbImage> {
        (**self).render(frame, detections)
    }
}

/// Look up the target label among the detector's classes.
pub fn resolve_class<D: Detector + ?Sized>(detector: &D, label: &str) -> Result<ClassId> {
    let names = detector.class_names();
    names
        .iter()
        .position(|name| name == label)
        .ok_or_else(|| Error::ClassConfig {
            label: label.to_string(),
            known: names.len(),
        })
}

/// Detections from one cycle, restricted to the target class.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub cycle: u32,
    pub detections: Vec<Detection>,
}

impl FrameResult {
    /// Keep only detections of `class` at or above `threshold`, in order.
    pub fn new(cycle: u32, raw: Vec<Detection>, class: ClassId, threshold: f32) -> Self {
        let before = raw.len();
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.class == class && d.confidence >= threshold)
            .collect();
        if detections.len() != before {
            log::debug!(
                "Cycle {}: dropped {} off-target detection(s)",
                cycle,
                before - detections.len()
            );
        }
        Self { cycle, detections }
    }

    pub fn count(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Highest confidence this cycle, if anything was detected
    pub fn best_confidence(&self) -> Option<f32> {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(None, |best, c| Some(best.map_or(c, |b: f32| b.max(c))))
    }
}

/// Copy `frame` and outline each detection.
pub fn annotate(frame: &Frame, detections: &[Detection], color: Rgb<u8>) -> RgbImage {
    let mut out = frame.clone();
    for det in detections {
        draw_box(&mut out, &det.bbox, color, BOX_THICKNESS);
    }
    out
}

fn draw_box(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(h - 1);
    let x0 = clamp_x(bbox.x);
    let y0 = clamp_y(bbox.y);
    let x1 = clamp_x(bbox.x + bbox.width);
    let y1 = clamp_y(bbox.y + bbox.height);
    if x1 < x0 || y1 < y0 {
        return;
    }

    for t in 0..thickness {
        let top = (y0 + t).min(y1);
        let bottom = y1.saturating_sub(t).max(y0);
        for x in x0..=x1 {
            img.put_pixel(x, top, color);
            img.put_pixel(x, bottom, color);
        }
        let left = (x0 + t).min(x1);
        let right = x1.saturating_sub(t).max(x0);
        for y in y0..=y1 {
            img.put_pixel(left, y, color);
            img.put_pixel(right, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Labels(Vec<String>);

    impl Detector for Labels {
        fn class_names(&self) -> &[String] {
            &self.0
        }

        fn classify(&mut self, _: &Frame, _: ClassId, _: f32) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    fn labels() -> Labels {
        Labels(vec!["person".into(), "elephant".into(), "zebra".into()])
    }

    fn det(class: ClassId, confidence: f32) -> Detection {
        Detection {
            class,
            confidence,
            bbox: BoundingBox {
                x: 1.0,
                y: 1.0,
                width: 4.0,
                height: 4.0,
            },
        }
    }

    // ── Class resolution ────────────────────────────────────────────

    #[test]
    fn resolve_known_class() {
        assert_eq!(resolve_class(&labels(), "elephant").unwrap(), 1);
    }

    #[test]
    fn resolve_is_exact() {
        assert!(resolve_class(&labels(), "Elephant").is_err());
    }

    #[test]
    fn resolve_unknown_class_is_config_error() {
        match resolve_class(&labels(), "rhino") {
            Err(Error::ClassConfig { label, known }) => {
                assert_eq!(label, "rhino");
                assert_eq!(known, 3);
            }
            other => panic!("expected ClassConfig, got {other:?}"),
        }
    }

    // ── Frame results ───────────────────────────────────────────────

    #[test]
    fn frame_result_filters_other_classes() {
        let result = FrameResult::new(0, vec![det(0, 0.99), det(1, 0.6), det(2, 0.9)], 1, 0.5);
        assert_eq!(result.count(), 1);
        assert_eq!(result.detections[0].class, 1);
    }

    #[test]
    fn frame_result_filters_below_threshold() {
        let result = FrameResult::new(0, vec![det(1, 0.49), det(1, 0.5)], 1, 0.5);
        assert_eq!(result.count(), 1);
        assert_eq!(result.detections[0].confidence, 0.5);
    }

    #[test]
    fn frame_result_keeps_order() {
        let result = FrameResult::new(2, vec![det(1, 0.7), det(1, 0.9), det(1, 0.8)], 1, 0.5);
        let confs: Vec<f32> = result.detections.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.7, 0.9, 0.8]);
        assert_eq!(result.best_confidence(), Some(0.9));
    }

    #[test]
    fn empty_frame_result_has_no_best() {
        let result = FrameResult::new(0, Vec::new(), 1, 0.5);
        assert!(result.is_empty());
        assert_eq!(result.best_confidence(), None);
    }

    // ── Geometry ────────────────────────────────────────────────────

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = det(1, 0.5).bbox;
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det(1, 0.5).bbox;
        let b = BoundingBox {
            x: 100.0,
            ..a
        };
        assert_eq!(a.iou(&b), 0.0);
    }

    // ── Annotation ──────────────────────────────────────────────────

    #[test]
    fn annotate_draws_outline_only() {
        let frame = RgbImage::new(20, 20);
        let bbox = BoundingBox {
            x: 2.0,
            y: 2.0,
            width: 12.0,
            height: 12.0,
        };
        let out = annotate(
            &frame,
            &[Detection {
                class: 1,
                confidence: 0.9,
                bbox,
            }],
            BOX_COLOR,
        );
        assert_eq!(*out.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*out.get_pixel(14, 14), BOX_COLOR);
        // Centre untouched
        assert_eq!(out.get_pixel(8, 8).0, [0, 0, 0]);
        // Source frame untouched
        assert_eq!(frame.get_pixel(2, 2).0, [0, 0, 0]);
    }

    #[test]
    fn annotate_clamps_boxes_outside_frame() {
        let frame = RgbImage::new(10, 10);
        let bbox = BoundingBox {
            x: -5.0,
            y: -5.0,
            width: 50.0,
            height: 50.0,
        };
        let out = annotate(
            &frame,
            &[Detection {
                class: 0,
                confidence: 0.9,
                bbox,
            }],
            BOX_COLOR,
        );
        assert_eq!(*out.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*out.get_pixel(9, 9), BOX_COLOR);
    }

    #[test]
    fn default_render_annotates() {
        let frame = RgbImage::new(8, 8);
        let out = labels().render(&frame, &[det(1, 0.9)]).unwrap();
        assert_eq!(*out.get_pixel(1, 1), BOX_COLOR);
    }
}
