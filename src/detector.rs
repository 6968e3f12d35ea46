// src/detector.rs

use crate::types::{Config, Frame};
use anyhow::{bail, Context, Result};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

const COCO_CLASSES: usize = 80;

// COCO class names in model output order; config class names are resolved
// against this table.
#[rustfmt::skip]
const COCO_NAMES: [&str; COCO_CLASSES] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train",
    "truck", "boat", "traffic light", "fire hydrant", "stop sign",
    "parking meter", "bench", "bird", "cat", "dog", "horse", "sheep", "cow",
    "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella", "handbag",
    "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard",
    "tennis racket", "bottle", "wine glass", "cup", "fork", "knife", "spoon",
    "bowl", "banana", "apple", "sandwich", "orange", "broccoli", "carrot",
    "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
    "hair drier", "toothbrush",
];

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// YOLOv8 detector over ONNX Runtime. Confidence thresholding and the class
/// allow-list live here; downstream components only ever see the filtered
/// bounding boxes.
pub struct YoloDetector {
    session: Session,
    input_size: usize,
    min_confidence: f32,
    nms_iou: f32,
    wanted_classes: Vec<usize>,
}

impl YoloDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let wanted_classes = resolve_class_ids(&config.detection.classes);
        if wanted_classes.is_empty() {
            bail!(
                "none of the configured classes {:?} are known COCO classes",
                config.detection.classes
            );
        }
        info!("Target class indexes: {:?}", wanted_classes);

        info!("Loading YOLO model: {}", config.model.path);
        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.model.path)
            .with_context(|| format!("failed to load model {}", config.model.path))?;
        info!("✓ YOLO detector initialized");

        Ok(Self {
            session,
            input_size: config.model.input_size,
            min_confidence: config.detection.min_confidence,
            nms_iou: config.detection.nms_iou_threshold,
            wanted_classes,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, scale, pad_x, pad_y) = self.preprocess(frame);
        let output = self.infer(&input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y);
        debug!("Detected {} object(s)", detections.len());
        Ok(detections)
    }

    /// Letterbox to `input_size` x `input_size`: scale to fit, pad with gray,
    /// normalize to [0, 1], HWC -> CHW.
    fn preprocess(&self, frame: &Frame) -> (Vec<f32>, f32, f32, f32) {
        let target = self.input_size;
        let scale =
            (target as f32 / frame.width as f32).min(target as f32 / frame.height as f32);
        let scaled_w = ((frame.width as f32 * scale) as usize).max(1);
        let scaled_h = ((frame.height as f32 * scale) as usize).max(1);
        let pad_x = (target - scaled_w) as f32 / 2.0;
        let pad_y = (target - scaled_h) as f32 / 2.0;

        let resized = resize_bilinear(&frame.data, frame.width, frame.height, scaled_w, scaled_h);

        let mut canvas = vec![114u8; target * target * 3];
        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src_idx = (y * scaled_w + x) * 3;
                let dst_idx = ((y + pad_y as usize) * target + x + pad_x as usize) * 3;
                canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
            }
        }

        let mut input = vec![0.0f32; 3 * target * target];
        for c in 0..3 {
            for h in 0..target {
                for w in 0..target {
                    let hwc_idx = (h * target + w) * 3 + c;
                    let chw_idx = c * target * target + h * target + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        (input, scale, pad_x, pad_y)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    /// Parse the [1, 84, N] output: bbox in center format plus 80 per-class
    /// scores per prediction. Keeps allow-listed classes above the
    /// confidence threshold, maps back through the letterbox, then NMS.
    fn postprocess(&self, output: &[f32], scale: f32, pad_x: f32, pad_y: f32) -> Vec<Detection> {
        let num_predictions = [8usize, 16, 32]
            .iter()
            .map(|stride| (self.input_size / stride).pow(2))
            .sum::<usize>();
        if output.len() < (4 + COCO_CLASSES) * num_predictions {
            debug!(
                "unexpected model output length {} for {} predictions",
                output.len(),
                num_predictions
            );
            return Vec::new();
        }
        let mut detections = Vec::new();

        for i in 0..num_predictions {
            let mut max_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..COCO_CLASSES {
                let conf = output[num_predictions * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < self.min_confidence || !self.wanted_classes.contains(&best_class) {
                continue;
            }

            let cx = output[i];
            let cy = output[num_predictions + i];
            let w = output[num_predictions * 2 + i];
            let h = output[num_predictions * 3 + i];

            // Center format -> corners, then undo the letterbox transform.
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(Detection {
                bbox: [x1, y1, x2, y2],
                confidence: max_conf,
                class_id: best_class,
                class_name: COCO_NAMES[best_class].to_string(),
            });
        }

        nms(detections, self.nms_iou)
    }
}

fn resolve_class_ids(names: &[String]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|name| COCO_NAMES.iter().position(|&n| n == name))
        .collect()
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    'outer: for det in detections {
        for kept in &keep {
            if calculate_iou(&kept.bbox, &det.bbox) >= iou_threshold {
                continue 'outer;
            }
        }
        keep.push(det);
    }
    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
