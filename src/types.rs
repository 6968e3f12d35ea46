use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub tracking: TrackingConfig,
    pub lanes: LanesSetting,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub input_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub min_confidence: f32,
    pub classes: Vec<String>,
    pub nms_iou_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub max_disappeared: i64,
    pub max_distance: f64,
}

/// Lane regions: either the `equal_vertical_3` preset (three equal vertical
/// bands of the frame) or an explicit list of polygons, each at least a
/// triangle, classified in list order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LanesSetting {
    Preset(String),
    Polygons(Vec<Vec<(f32, f32)>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub save_annotated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Axis-aligned box as (x1, y1, x2, y2) in pixel coordinates. Degenerate
/// boxes are tolerated everywhere; geometry helpers never panic on them.
pub type BoundingBox = [f32; 4];

/// 2-D point in pixel coordinates.
pub type Centroid = (f32, f32);

pub fn centroid_of(bbox: &BoundingBox) -> Centroid {
    ((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0)
}

/// One decoded video frame, RGB24 pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}
