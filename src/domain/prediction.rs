use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::detection::{Detection, RawDetection};
use super::errors::{DomainError, DomainResult};
use super::labels::{label_for, FALLBACK_EMOTION};

/// Candidates scoring below this are never reported.
pub const CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Result of one prediction: every detection that cleared the threshold plus
/// the single strongest one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionSummary {
    pub detections: Vec<Detection>,
    pub top_emotion: String,
    pub top_conf: f32,
}

impl PredictionSummary {
    pub fn empty() -> Self {
        Self {
            detections: Vec::new(),
            top_emotion: FALLBACK_EMOTION.to_string(),
            top_conf: 0.0,
        }
    }

    /// Filters `candidates` by `threshold`, resolves labels and tracks the
    /// highest-confidence survivor. Model order is preserved and the first of
    /// several equal maxima wins.
    pub fn from_candidates(candidates: &[RawDetection], threshold: f32) -> DomainResult<Self> {
        let mut summary = Self::empty();

        for raw in candidates {
            if raw.score < threshold {
                continue;
            }
            let label = label_for(raw.class_id).ok_or_else(|| {
                DomainError::Inference(format!("class index {} has no label", raw.class_id))
            })?;

            if raw.score > summary.top_conf {
                summary.top_conf = raw.score;
                summary.top_emotion = label.to_string();
            }
            summary.detections.push(Detection {
                x1: raw.x1,
                y1: raw.y1,
                x2: raw.x2,
                y2: raw.y2,
                label: label.to_string(),
                conf: raw.score,
            });
        }

        if summary.detections.is_empty() {
            return Ok(Self::empty());
        }
        Ok(summary)
    }
}

/// Compact per-label count, e.g. `"2 happy, 1 sad"`, for log lines.
pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(det.label.as_str()).or_insert(0usize) += 1;
    }
    counts
        .iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}
