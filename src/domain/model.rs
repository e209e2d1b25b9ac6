use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the detector weights live and where to get them if they are missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSource {
    pub weights_path: PathBuf,
    pub remote_file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloParams {
    pub input_size: u32,        // square letterbox side
    pub conf_threshold: f32,    // candidate floor before NMS
    pub iou_threshold: f32,     // 0..1
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}
