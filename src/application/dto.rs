use serde::{Deserialize, Serialize};

use crate::domain::{detection::Detection, prediction::PredictionSummary};

/// Body of a successful `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub detections: Vec<Detection>,
    pub top_emotion: String,
    pub top_conf: f32,
}

impl From<PredictionSummary> for PredictResponse {
    fn from(s: PredictionSummary) -> Self {
        Self {
            detections: s.detections,
            top_emotion: s.top_emotion,
            top_conf: s.top_conf,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
